use advance_ledger::application::advances::AdvanceScheduler;
use advance_ledger::application::processor::{DuePaymentProcessor, ProcessorConfig, Settlement};
use advance_ledger::application::scheduler::{PaymentScheduler, SchedulerConfig};
use advance_ledger::application::service::BankService;
use advance_ledger::domain::account::{AccountId, Amount};
use advance_ledger::domain::advance::{DEFAULT_INSTALLMENTS, INSTALLMENT_SPACING_DAYS};
use advance_ledger::domain::ports::ClockHandle;
use advance_ledger::infrastructure::Stores;
use advance_ledger::infrastructure::clock::SystemClock;
use advance_ledger::infrastructure::deduction::LedgerDeduction;
use advance_ledger::interfaces::api::{Api, DEFAULT_PAGE_LIMIT, TransactionsQuery};
use advance_ledger::interfaces::csv::account_reader::AccountReader;
use advance_ledger::interfaces::csv::account_writer::AccountWriter;
use advance_ledger::interfaces::csv::schedule_writer::ScheduleWriter;
use advance_ledger::interfaces::csv::transaction_writer::TransactionWriter;
use advance_ledger::interfaces::csv::transfer_reader::TransferReader;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long, global = true, env = "ADVANCE_LEDGER_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    accounts: AccountsConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct AccountsConfig {
    /// Account advances are funded from
    #[arg(long, global = true, env = "ADVANCE_LEDGER_TREASURY_ACCOUNT")]
    treasury_account: Option<AccountId>,

    /// Account installments are collected into
    #[arg(long, global = true, env = "ADVANCE_LEDGER_COLLECTION_ACCOUNT")]
    collection_account: Option<AccountId>,
}

#[derive(Subcommand)]
enum Command {
    /// Seed accounts, run a batch of transfers and print the final balances
    Transfer {
        /// Accounts CSV file (id, owner_name, balance)
        accounts: PathBuf,

        /// Transfers CSV file (src_account_id, dst_account_id, amount, direction)
        transfers: PathBuf,

        /// Also write every ledger record to this CSV file
        #[arg(long)]
        ledger_out: Option<PathBuf>,
    },
    /// Seed accounts, request an advance and print its installment schedule
    Advance {
        /// Accounts CSV file (id, owner_name, balance)
        accounts: PathBuf,

        /// Account receiving the advance
        #[arg(long)]
        dst: AccountId,

        #[arg(long)]
        amount: Decimal,

        #[command(flatten)]
        schedule: ScheduleConfig,
    },
    /// Collect due installments
    Process {
        /// Run a single claim-and-settle pass instead of the periodic scheduler
        #[arg(long)]
        once: bool,

        /// Seconds between scheduler ticks
        #[arg(long, env = "ADVANCE_LEDGER_TICK_SECS", default_value_t = 60)]
        tick_secs: u64,

        #[arg(long, env = "ADVANCE_LEDGER_WORKERS", default_value_t = 4)]
        workers: usize,

        #[arg(long, env = "ADVANCE_LEDGER_QUEUE_CAPACITY", default_value_t = 256)]
        queue_capacity: usize,

        /// Seconds a single deduction may take before it counts as failed
        #[arg(long, env = "ADVANCE_LEDGER_DEDUCTION_TIMEOUT_SECS", default_value_t = 30)]
        deduction_timeout_secs: u64,

        #[command(flatten)]
        schedule: ScheduleConfig,
    },
    /// Print one page of the transaction ledger as JSON
    Ledger {
        /// Window start (inclusive), RFC 3339
        #[arg(long)]
        start: DateTime<Utc>,

        /// Window end (exclusive), RFC 3339
        #[arg(long)]
        end: DateTime<Utc>,

        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
}

#[derive(Args)]
struct ScheduleConfig {
    #[arg(long, env = "ADVANCE_LEDGER_INSTALLMENTS", default_value_t = DEFAULT_INSTALLMENTS)]
    installments: u32,

    #[arg(long, env = "ADVANCE_LEDGER_SPACING_DAYS", default_value_t = INSTALLMENT_SPACING_DAYS)]
    spacing_days: i64,
}

impl ScheduleConfig {
    fn spacing(&self) -> chrono::Duration {
        chrono::Duration::days(self.spacing_days)
    }
}

impl AccountsConfig {
    fn treasury(&self) -> Result<AccountId> {
        self.treasury_account
            .ok_or_else(|| miette!("--treasury-account (or ADVANCE_LEDGER_TREASURY_ACCOUNT) is required"))
    }

    fn collection(&self) -> Result<AccountId> {
        self.collection_account
            .ok_or_else(|| miette!("--collection-account (or ADVANCE_LEDGER_COLLECTION_ACCOUNT) is required"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var("ADVANCE_LEDGER_LOG")
        .from_env()
        .into_diagnostic()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stores = open_stores(&cli)?;
    let clock: ClockHandle = Arc::new(SystemClock);

    match cli.command {
        Command::Transfer {
            accounts,
            transfers,
            ledger_out,
        } => {
            seed_accounts(&stores, &accounts).await?;
            // Plain transfers never touch the treasury.
            let treasury = cli.accounts.treasury_account.unwrap_or_default();
            let api = Api::new(Arc::new(BankService::new(&stores, clock, treasury)));

            let file = File::open(transfers).into_diagnostic()?;
            let mut recorded = Vec::new();
            for request in TransferReader::new(file).transfers() {
                match request {
                    Ok(request) => recorded.push(api.post_transaction(request).await.into_diagnostic()?),
                    Err(e) => warn!(error = %e, "Error reading transfer"),
                }
            }

            if let Some(path) = ledger_out {
                let file = File::create(path).into_diagnostic()?;
                TransactionWriter::new(file)
                    .write_transactions(&recorded)
                    .into_diagnostic()?;
            }

            let accounts = stores.accounts.get_all().await.into_diagnostic()?;
            AccountWriter::new(io::stdout().lock())
                .write_accounts(accounts)
                .into_diagnostic()?;
        }
        Command::Advance {
            accounts,
            dst,
            amount,
            schedule,
        } => {
            seed_accounts(&stores, &accounts).await?;
            let amount = Amount::new(amount).into_diagnostic()?;
            let service = bank_service(&stores, clock, cli.accounts.treasury()?, &schedule);

            let receipt = service.request_advance(dst, amount).await.into_diagnostic()?;
            if !receipt.funding.is_successful() {
                return Err(miette!(
                    "Advance {} was not funded: {}",
                    receipt.advance.id,
                    receipt.funding.reason.unwrap_or_default()
                ));
            }
            ScheduleWriter::new(io::stdout().lock())
                .write_payments(&receipt.payments)
                .into_diagnostic()?;
        }
        Command::Process {
            once,
            tick_secs,
            workers,
            queue_capacity,
            deduction_timeout_secs,
            schedule,
        } => {
            let service = Arc::new(bank_service(
                &stores,
                clock.clone(),
                cli.accounts.treasury_account.unwrap_or_default(),
                &schedule,
            ));
            let deduction = LedgerDeduction::new(service, cli.accounts.collection()?);
            let processor = Arc::new(DuePaymentProcessor::new(
                stores.advances.clone(),
                stores.payments.clone(),
                Arc::new(deduction),
                ProcessorConfig {
                    deduction_timeout: Duration::from_secs(deduction_timeout_secs),
                    spacing: schedule.spacing(),
                },
            ));

            if once {
                let settlements = processor.run_once(clock.now()).await.into_diagnostic()?;
                for settlement in settlements {
                    match settlement {
                        Settlement::Paid(key) => println!("{key},paid"),
                        Settlement::Failed { key, successor } => {
                            println!("{key},failed,{}", successor.key())
                        }
                        Settlement::Skipped(key, status) => debug!(%key, ?status, "Skipped"),
                    }
                }
                return Ok(());
            }

            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, shutting down");
                }
                on_signal.cancel();
            });

            PaymentScheduler::new(
                processor,
                clock,
                SchedulerConfig {
                    tick_interval: Duration::from_secs(tick_secs.max(1)),
                    workers,
                    queue_capacity,
                },
            )
            .run(shutdown)
            .await
            .into_diagnostic()?;
        }
        Command::Ledger {
            start,
            end,
            page,
            limit,
        } => {
            let service = BankService::new(&stores, clock, cli.accounts.treasury_account.unwrap_or_default());
            let page = Api::new(Arc::new(service))
                .get_transactions(TransactionsQuery {
                    start_timestamp: start,
                    end_timestamp: end,
                    page,
                    limit,
                })
                .await
                .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&page).into_diagnostic()?);
        }
    }

    Ok(())
}

fn open_stores(cli: &Cli) -> Result<Stores> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        return Stores::rocksdb(db_path).into_diagnostic();
    }
    let _ = cli;
    Ok(Stores::in_memory())
}

fn bank_service(
    stores: &Stores,
    clock: ClockHandle,
    treasury: AccountId,
    schedule: &ScheduleConfig,
) -> BankService {
    let scheduler = AdvanceScheduler::new(stores.advances.clone(), stores.payments.clone(), clock.clone())
        .with_spacing(schedule.spacing());
    BankService::new(stores, clock, treasury)
        .with_installments(schedule.installments)
        .with_scheduler(scheduler)
}

/// Opens every account of the seed file that the store does not know yet, so
/// a persistent database can be re-seeded with the same file.
async fn seed_accounts(stores: &Stores, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for account in AccountReader::new(file).accounts() {
        let account = match account {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Error reading account");
                continue;
            }
        };
        if stores.accounts.get(account.id).await.into_diagnostic()?.is_some() {
            debug!(account_id = account.id, "Account already exists, keeping stored balance");
            continue;
        }
        stores.accounts.open_account(account).await.into_diagnostic()?;
    }
    Ok(())
}
