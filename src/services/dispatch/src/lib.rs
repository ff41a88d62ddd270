//! # Relay Dispatch Service
//!
//! Notification dispatch and retry engine for the Relay platform providing:
//! - Durable notification intake with validation
//! - Batch claiming with crash-safe attempt accounting
//! - Pluggable delivery channels (log, webhook, email)
//! - Exponential backoff retries with an exhaustion parking lot
//! - Single-flight job triggers over HTTP
//! - Background sweep scheduling
//!
//! ## Features
//!
//! - **Atomic claiming**: Batches move to `processing` in one step, so
//!   concurrent sweeps never deliver the same record twice
//! - **Deterministic retries**: Exponential backoff with a hard cap, no jitter
//! - **Exhaustion parking**: Records that spend their attempt budget land in
//!   `retry_exhausted` and are never retried again
//! - **Stale reclaim**: Records abandoned mid-flight by a crash return to
//!   `pending` after a visibility timeout
//! - **Coalesced triggers**: A trigger while the same job is running folds
//!   into the in-flight run instead of stacking
//! - **Prometheus metrics**: Attempt outcomes, durations, and per-status gauges
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_dispatch::{DispatchConfig, DispatchService};
//! use relay_shared::{CreateNotificationRequest, JobKind};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DispatchConfig::default();
//!     let service = DispatchService::new(config).await?;
//!
//!     let record = service
//!         .create_notification(CreateNotificationRequest {
//!             user_id: 42,
//!             payload: json!({"subject": "Welcome", "body": "Your account is ready."}),
//!         })
//!         .await?;
//!     println!("Notification queued: {}", record.id);
//!
//!     let ack = service.trigger(JobKind::ProcessPending);
//!     println!("Sweep accepted: {}", ack.accepted);
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod channels;
pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod retry;
pub mod routes;
pub mod store;
pub mod sweeper;
pub mod worker;

pub use config::DispatchConfig;
pub use controller::JobController;
pub use error::{DispatchError, Result};
pub use metrics::DispatchMetrics;
pub use retry::RetryPolicy;
pub use store::{AttemptOutcome, MemoryStore, NotificationStore, PostgresStore};
pub use sweeper::BackgroundSweeper;
pub use worker::{DispatchWorker, SweepStats};

// Re-export shared types for convenience
pub use relay_shared::{
    CreateNotificationRequest, JobKind, NotificationFilter, NotificationRecord,
    NotificationStatus, StatusCounts, TriggerAck,
};

use channels::{build_channel, DeliveryChannel};

/// Main dispatch service struct that wires the store, channel, worker,
/// controller, and background sweeper together.
#[derive(Clone)]
pub struct DispatchService {
    config: DispatchConfig,
    controller: Arc<JobController>,
    sweeper: BackgroundSweeper,
}

impl DispatchService {
    /// Create a new dispatch service with the given configuration.
    ///
    /// Backing storage follows `config.database.enabled`: Postgres when set,
    /// an in-memory store otherwise.
    pub async fn new(config: DispatchConfig) -> Result<Self> {
        config.validate().map_err(DispatchError::configuration)?;

        let store: Arc<dyn NotificationStore> = if config.database.enabled {
            Arc::new(PostgresStore::connect(&config.database).await?)
        } else {
            Arc::new(MemoryStore::new())
        };
        let channel = build_channel(&config.channel).await?;

        Self::with_store_and_channel(config, store, channel)
    }

    /// Create a service around an explicit store and channel.
    ///
    /// Used by tests and embedders that manage their own backing storage.
    pub fn with_store_and_channel(
        config: DispatchConfig,
        store: Arc<dyn NotificationStore>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Result<Self> {
        let dispatch_metrics = DispatchMetrics::new(&config.metrics)?;
        let policy = RetryPolicy::from(&config.retry);

        let worker = Arc::new(DispatchWorker::new(
            store.clone(),
            channel.clone(),
            policy,
            config.worker.clone(),
            dispatch_metrics.clone(),
        ));
        let controller = Arc::new(JobController::new(
            store,
            channel,
            worker,
            dispatch_metrics,
        ));
        let sweeper = BackgroundSweeper::new(config.sweeper.clone(), controller.clone());

        Ok(Self {
            config,
            controller,
            sweeper,
        })
    }

    /// Accept a notification for delivery.
    pub async fn create_notification(
        &self,
        request: CreateNotificationRequest,
    ) -> Result<NotificationRecord> {
        self.controller.create_notification(request).await
    }

    /// Trigger a background job. Returns immediately.
    pub fn trigger(&self, kind: JobKind) -> TriggerAck {
        self.controller.trigger(kind)
    }

    /// Get a notification by ID.
    pub async fn get_notification(&self, id: uuid::Uuid) -> Result<Option<NotificationRecord>> {
        self.controller.get_notification(id).await
    }

    /// List notifications with optional filtering.
    pub async fn list_notifications(
        &self,
        filter: NotificationFilter,
    ) -> Result<Vec<NotificationRecord>> {
        self.controller.list_notifications(filter).await
    }

    /// Record counts per status.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        self.controller.status_counts().await
    }

    /// Start the background sweeper.
    pub async fn start(&self) -> Result<()> {
        self.sweeper.start().await
    }

    /// Stop the background sweeper.
    pub async fn shutdown(&self) -> Result<()> {
        self.sweeper.stop().await
    }

    /// Build the HTTP router for this service.
    pub fn router(&self) -> axum::Router {
        routes::create_router(self.controller.clone())
    }

    /// Get the job controller for advanced operations.
    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    /// Service configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_service_creation() {
        let config = DispatchConfig::default();
        let service = DispatchService::new(config).await;
        assert!(service.is_ok());
    }
}
