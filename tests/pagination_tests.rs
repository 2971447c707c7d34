use advance_ledger::domain::account::Amount;
use advance_ledger::domain::transaction::{Direction, Transaction};
use advance_ledger::domain::ports::Clock;
use advance_ledger::infrastructure::clock::ManualClock;
use advance_ledger::interfaces::api::{Api, TransactionRequest, TransactionsQuery};
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

mod common;

/// Records `count` transfers; every third one shares its predecessor's
/// timestamp so ties have to be broken by insertion order.
async fn seeded_api(count: usize) -> (Api, ManualClock) {
    let stores = common::stores_with(&[(1, dec!(1000)), (2, dec!(1000))]).await;
    let clock = ManualClock::new(common::epoch());
    let api = Api::new(Arc::new(common::service(&stores, &clock)));

    for i in 0..count {
        if i % 3 != 2 {
            clock.advance(Duration::seconds(1));
        }
        api.post_transaction(TransactionRequest {
            src_account_id: 1,
            dst_account_id: 2,
            amount: Amount::new(dec!(1)).unwrap(),
            direction: if i % 2 == 0 { Direction::Debit } else { Direction::Credit },
        })
        .await
        .unwrap();
    }
    (api, clock)
}

fn query(start: DateTime<Utc>, end: DateTime<Utc>, page: usize, limit: usize) -> TransactionsQuery {
    TransactionsQuery {
        start_timestamp: start,
        end_timestamp: end,
        page,
        limit,
    }
}

#[tokio::test]
async fn test_pages_concatenate_to_full_ordered_set() {
    let (api, clock) = seeded_api(23).await;
    let start = common::epoch();
    let end = clock.now() + Duration::seconds(1);

    let full = api.get_transactions(query(start, end, 0, 1000)).await.unwrap();
    assert_eq!(full.total_items, 23);
    let ordered: Vec<(DateTime<Utc>, u64)> = full.items.iter().map(|tx| (tx.timestamp, tx.id)).collect();
    let mut sorted = ordered.clone();
    sorted.sort();
    assert_eq!(ordered, sorted);

    for limit in [1, 4, 5, 23, 50] {
        let first = api.get_transactions(query(start, end, 0, limit)).await.unwrap();
        assert_eq!(first.number_of_pages, 23usize.div_ceil(limit));

        let mut concatenated: Vec<Transaction> = Vec::new();
        for page in 0..first.number_of_pages {
            let page = api.get_transactions(query(start, end, page, limit)).await.unwrap();
            assert_eq!(page.total_items, 23);
            assert!(page.items.len() <= limit);
            concatenated.extend(page.items);
        }
        assert_eq!(concatenated, full.items, "limit {limit}");

        let beyond = api
            .get_transactions(query(start, end, first.number_of_pages, limit))
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_items, 23);
    }
}

#[tokio::test]
async fn test_window_is_half_open() {
    let (api, _) = seeded_api(6).await;
    // Timestamps are epoch+1, +2, +2, +3, +4, +4.
    let at = |secs| common::epoch() + Duration::seconds(secs);

    let page = api.get_transactions(query(at(2), at(4), 0, 100)).await.unwrap();
    assert_eq!(page.total_items, 3);
    assert!(page.items.iter().all(|tx| tx.timestamp >= at(2) && tx.timestamp < at(4)));

    let empty = api.get_transactions(query(at(4), at(4), 0, 100)).await.unwrap();
    assert_eq!(empty.total_items, 0);
    assert_eq!(empty.number_of_pages, 0);
}
