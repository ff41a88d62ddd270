//! Batch job controller
//!
//! Front door for the engine: validates and stores new notifications,
//! answers queries, and owns the single-flight trigger semantics. At
//! most one run per job kind is in flight at any time; a trigger that
//! arrives during a run acknowledges immediately as coalesced instead of
//! queueing a second run.

use relay_shared::{
    CreateNotificationRequest, JobKind, NotificationFilter, NotificationRecord, StatusCounts,
    TriggerAck,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

use crate::channels::DeliveryChannel;
use crate::error::Result;
use crate::metrics::DispatchMetrics;
use crate::store::NotificationStore;
use crate::worker::DispatchWorker;

pub struct JobController {
    store: Arc<dyn NotificationStore>,
    channel: Arc<dyn DeliveryChannel>,
    worker: Arc<DispatchWorker>,
    metrics: DispatchMetrics,
    pending_guard: Arc<Semaphore>,
    retry_guard: Arc<Semaphore>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
        worker: Arc<DispatchWorker>,
        metrics: DispatchMetrics,
    ) -> Self {
        Self {
            store,
            channel,
            worker,
            metrics,
            pending_guard: Arc::new(Semaphore::new(1)),
            retry_guard: Arc::new(Semaphore::new(1)),
        }
    }

    /// Validate and persist a new notification.
    ///
    /// Creation is synchronous; delivery is not attempted here. The
    /// record is picked up by the next pending sweep.
    pub async fn create_notification(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<NotificationRecord> {
        request.validate()?;

        let record = self
            .store
            .create(request.user_id, request.payload)
            .await?;
        self.metrics.record_created();

        info!(
            "Created notification {} for user {}",
            record.id, record.user_id
        );
        Ok(record)
    }

    /// Trigger a job run and return immediately.
    ///
    /// The sweep itself runs on a spawned task holding the kind's permit.
    /// If the permit is taken, a run is already in flight and this
    /// trigger coalesces into it.
    pub fn trigger(&self, kind: JobKind) -> TriggerAck {
        let guard = match kind {
            JobKind::ProcessPending => self.pending_guard.clone(),
            JobKind::RetryFailed => self.retry_guard.clone(),
        };

        match guard.try_acquire_owned() {
            Ok(permit) => {
                self.metrics.record_trigger(kind, false);
                let worker = self.worker.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let result = match kind {
                        JobKind::ProcessPending => worker.run_pending_sweep().await,
                        JobKind::RetryFailed => worker.run_retry_sweep().await,
                    };
                    if let Err(e) = result {
                        error!("{} run failed: {}", kind, e);
                    }
                });

                TriggerAck::started(kind)
            }
            Err(_) => {
                self.metrics.record_trigger(kind, true);
                debug!("{} run already in flight, coalescing trigger", kind);
                TriggerAck::coalesced(kind)
            }
        }
    }

    /// Return abandoned processing records to pending.
    pub async fn reclaim_stale(&self) -> Result<u64> {
        self.worker.reclaim_stale().await
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        self.store.get(id).await
    }

    pub async fn list_notifications(
        &self,
        filter: NotificationFilter,
    ) -> Result<Vec<NotificationRecord>> {
        self.store.list(&filter).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        self.store.status_counts().await
    }

    /// Channel name and whether it currently reports healthy.
    pub async fn channel_health(&self) -> (String, bool) {
        let healthy = self.channel.health_check().await.unwrap_or(false);
        (self.channel.info().name, healthy)
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }
}
