//! Record storage backends
//!
//! The store owns every status transition. Claims are atomic: a record
//! returned from a claim call is visible to exactly one caller, already
//! stamped `processing` with its attempt count incremented. Everything
//! the worker later reports goes through [`NotificationStore::record_outcome`].

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{NotificationFilter, NotificationRecord, StatusCounts};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::retry::RetryPolicy;

/// What a delivery attempt produced, as reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// The attempt failed. `exhausted` is true when the record has no
    /// attempts left and must park as `retry_exhausted` instead of
    /// `failed`.
    Failed { error: String, exhausted: bool },
}

impl AttemptOutcome {
    pub fn failed<S: Into<String>>(error: S, exhausted: bool) -> Self {
        Self::Failed {
            error: error.into(),
            exhausted,
        }
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a new pending record with zero attempts.
    async fn create(&self, user_id: i64, payload: Value) -> Result<NotificationRecord>;

    /// Fetch a single record by id.
    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>>;

    /// List records matching the filter, newest first.
    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<NotificationRecord>>;

    /// Atomically claim up to `limit` pending records, oldest first.
    ///
    /// Claimed records come back as `processing` with `attempt_count`
    /// incremented and `last_attempt_at` stamped. Concurrent callers
    /// never receive the same record.
    async fn claim_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>>;

    /// Atomically claim up to `limit` failed records that are eligible
    /// for retry at `now` under `policy`, oldest first. Ineligible
    /// records are left untouched.
    async fn claim_retryable(
        &self,
        limit: u32,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>>;

    /// Record the outcome of a delivery attempt.
    ///
    /// The record must currently be `processing`; anything else returns
    /// a consistency error and leaves the record untouched.
    async fn record_outcome(&self, id: Uuid, outcome: AttemptOutcome) -> Result<()>;

    /// Park failed records that are out of attempts as `retry_exhausted`.
    /// Returns how many records were parked.
    async fn mark_exhausted(&self, max_attempts: u32) -> Result<u64>;

    /// Return `processing` records whose last attempt started before
    /// `cutoff` to `pending`, making them claimable again. Returns how
    /// many records were reclaimed.
    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Count records per status.
    async fn status_counts(&self) -> Result<StatusCounts>;
}
