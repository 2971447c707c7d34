use super::processor::DuePaymentProcessor;
use crate::domain::advance::{AdvancePayment, PaymentKey};
use crate::domain::ports::ClockHandle;
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Drives a [`DuePaymentProcessor`] on a timer.
///
/// Each tick claims the due payments and pushes their keys onto a bounded
/// queue; a fixed pool of workers pops keys and settles them. A full queue
/// holds the ticker back until workers catch up. Payments an earlier run left
/// `pending_processing` are queued once, before the first tick.
pub struct PaymentScheduler {
    processor: Arc<DuePaymentProcessor>,
    clock: ClockHandle,
    config: SchedulerConfig,
}

type Queue = Arc<Mutex<mpsc::Receiver<PaymentKey>>>;

impl PaymentScheduler {
    pub fn new(processor: Arc<DuePaymentProcessor>, clock: ClockHandle, config: SchedulerConfig) -> Self {
        Self {
            processor,
            clock,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled or a storage fault occurs.
    ///
    /// On shutdown the ticker stops first; workers finish whatever is already
    /// queued and then exit. A fault in any task cancels the others and is
    /// returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let queue: Queue = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers.max(1) {
            workers.spawn(worker(
                worker_id,
                Arc::clone(&self.processor),
                Arc::clone(&queue),
                shutdown.clone(),
            ));
        }
        drop(queue);
        info!(
            workers = self.config.workers.max(1),
            interval = ?self.config.tick_interval,
            "Payment scheduler started"
        );

        let ticked = self.tick_loop(tx, &shutdown).await;

        let mut outcome = ticked;
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(|e| LedgerError::internal(e.to_string())).and_then(|r| r);
            if outcome.is_ok() {
                outcome = result;
            }
        }
        info!("Payment scheduler stopped");
        outcome
    }

    /// One claim pass, enqueueing every claimed payment. Returns how many were
    /// claimed.
    pub async fn tick(&self, queue: &mpsc::Sender<PaymentKey>) -> Result<usize> {
        let claimed = self.processor.claim_due(self.clock.now()).await?;
        enqueue(queue, &claimed).await
    }

    /// Enqueues every payment left unsettled by an earlier run. Only safe
    /// before this scheduler dispatches anything itself.
    pub async fn redeliver(&self, queue: &mpsc::Sender<PaymentKey>) -> Result<usize> {
        let stale = self.processor.recover_pending().await?;
        enqueue(queue, &stale).await
    }

    async fn tick_loop(&self, tx: mpsc::Sender<PaymentKey>, shutdown: &CancellationToken) -> Result<()> {
        if let Err(e) = self.redeliver(&tx).await {
            error!(error = %e, "Redelivering unsettled payments failed");
            shutdown.cancel();
            return Err(e);
        }

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    match self.tick(&tx).await {
                        Ok(count) => debug!(count, "Tick dispatched payments"),
                        Err(e) => {
                            error!(error = %e, "Claiming due payments failed");
                            shutdown.cancel();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

async fn enqueue(queue: &mpsc::Sender<PaymentKey>, payments: &[AdvancePayment]) -> Result<usize> {
    for payment in payments {
        queue
            .send(payment.key())
            .await
            .map_err(|_| LedgerError::internal("payment queue closed"))?;
    }
    Ok(payments.len())
}

async fn worker(
    worker_id: usize,
    processor: Arc<DuePaymentProcessor>,
    queue: Queue,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        // The ticker owns the only sender, so `None` means it has stopped and
        // the queue is drained.
        let Some(key) = queue.lock().await.recv().await else {
            debug!(worker_id, "Payment worker exiting");
            return Ok(());
        };

        if let Err(e) = processor.settle(key).await {
            error!(worker_id, %key, error = %e, "Settling payment failed");
            shutdown.cancel();
            return Err(e);
        }
    }
}
