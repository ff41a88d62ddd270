//! Dispatch worker
//!
//! Claims batches from the store, pushes each record through the delivery
//! channel under a per-attempt timeout, and reports outcomes back. A
//! failing record never stops its batch, and a sweep keeps claiming until
//! the store has nothing left to hand out.

use chrono::Utc;
use relay_shared::NotificationRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channels::DeliveryChannel;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use crate::retry::RetryPolicy;
use crate::store::{AttemptOutcome, NotificationStore};

/// Totals from one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub claimed: usize,
    pub delivered: usize,
    pub failed: usize,
    pub exhausted: usize,
}

impl SweepStats {
    fn merge(&mut self, other: SweepStats) {
        self.claimed += other.claimed;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.exhausted += other.exhausted;
    }
}

pub struct DispatchWorker {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn DeliveryChannel>,
    policy: RetryPolicy,
    config: WorkerConfig,
    metrics: DispatchMetrics,
}

impl DispatchWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
        policy: RetryPolicy,
        config: WorkerConfig,
        metrics: DispatchMetrics,
    ) -> Self {
        Self {
            store,
            channel,
            policy,
            config,
            metrics,
        }
    }

    /// Drain the pending queue, oldest first, in bounded batches.
    pub async fn run_pending_sweep(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        loop {
            let batch = self.store.claim_pending(self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            stats.merge(self.process_batch(batch).await);
        }

        if stats.claimed > 0 {
            info!(
                "Pending sweep finished: {} claimed, {} delivered, {} failed, {} exhausted",
                stats.claimed, stats.delivered, stats.failed, stats.exhausted
            );
        } else {
            debug!("Pending sweep found nothing to claim");
        }

        self.refresh_status_gauges().await;
        Ok(stats)
    }

    /// Park records that are out of attempts, then drain everything whose
    /// backoff has elapsed.
    pub async fn run_retry_sweep(&self) -> Result<SweepStats> {
        let parked = self.store.mark_exhausted(self.policy.max_attempts).await?;
        if parked > 0 {
            warn!("Parked {} notifications with no attempts left", parked);
            self.metrics.record_exhausted(parked);
        }

        let mut stats = SweepStats::default();

        loop {
            let batch = self
                .store
                .claim_retryable(self.config.batch_size, &self.policy, Utc::now())
                .await?;
            if batch.is_empty() {
                break;
            }
            stats.merge(self.process_batch(batch).await);
        }

        if stats.claimed > 0 {
            info!(
                "Retry sweep finished: {} claimed, {} delivered, {} failed, {} exhausted",
                stats.claimed, stats.delivered, stats.failed, stats.exhausted
            );
        } else {
            debug!("Retry sweep found nothing eligible");
        }

        self.refresh_status_gauges().await;
        Ok(stats)
    }

    /// Return processing records whose claim is older than the visibility
    /// timeout to pending. Covers workers that died mid-attempt.
    pub async fn reclaim_stale(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.config.visibility_timeout();
        let reclaimed = self.store.reclaim_stale(cutoff).await?;

        if reclaimed > 0 {
            warn!("Reclaimed {} stale processing notifications", reclaimed);
            self.metrics.record_reclaimed(reclaimed);
        }

        Ok(reclaimed)
    }

    async fn process_batch(&self, batch: Vec<NotificationRecord>) -> SweepStats {
        let mut stats = SweepStats {
            claimed: batch.len(),
            ..Default::default()
        };

        for record in batch {
            match self.attempt_delivery(record).await {
                AttemptOutcome::Delivered => stats.delivered += 1,
                AttemptOutcome::Failed {
                    exhausted: true, ..
                } => stats.exhausted += 1,
                AttemptOutcome::Failed { .. } => stats.failed += 1,
            }
        }

        stats
    }

    /// Run one delivery attempt and persist its outcome.
    ///
    /// The record arrives already claimed, so its attempt count reflects
    /// this attempt. Failures here are contained to the record: the
    /// outcome is always reported, and a store error while reporting is
    /// logged without aborting the batch.
    async fn attempt_delivery(&self, record: NotificationRecord) -> AttemptOutcome {
        let started = Instant::now();
        let send_result = tokio::time::timeout(
            self.config.attempt_timeout(),
            self.channel.send(&record),
        )
        .await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match send_result {
            Ok(Ok(())) => {
                debug!(
                    "Notification {} delivered on attempt {}",
                    record.id, record.attempt_count
                );
                self.metrics.record_attempt("delivered", elapsed);
                AttemptOutcome::Delivered
            }
            Ok(Err(e)) => {
                let exhausted = self.policy.exhausts(record.attempt_count);
                warn!(
                    "Delivery attempt {} for notification {} failed: {}",
                    record.attempt_count, record.id, e
                );
                self.metrics.record_attempt("failed", elapsed);
                AttemptOutcome::failed(e.to_string(), exhausted)
            }
            Err(_) => {
                let exhausted = self.policy.exhausts(record.attempt_count);
                warn!(
                    "Delivery attempt {} for notification {} timed out after {}s",
                    record.attempt_count, record.id, self.config.attempt_timeout_seconds
                );
                self.metrics.record_attempt("timed_out", elapsed);
                AttemptOutcome::failed(
                    format!(
                        "delivery attempt timed out after {}s",
                        self.config.attempt_timeout_seconds
                    ),
                    exhausted,
                )
            }
        };

        if let AttemptOutcome::Failed {
            exhausted: true, ..
        } = outcome
        {
            error!(
                "Notification {} exhausted its {} attempts",
                record.id, self.policy.max_attempts
            );
            self.metrics.record_exhausted(1);
        }

        if let Err(e) = self.store.record_outcome(record.id, outcome.clone()).await {
            error!(
                "Failed to record outcome for notification {}: {}",
                record.id, e
            );
        }

        outcome
    }

    async fn refresh_status_gauges(&self) {
        if let Ok(counts) = self.store.status_counts().await {
            self.metrics.set_status_counts(&counts);
        }
    }
}
