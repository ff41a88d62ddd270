//! In-memory storage backend
//!
//! Keeps all records behind a single async mutex, which makes every
//! claim one critical section. Used in development and tests; state is
//! lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{NotificationFilter, NotificationRecord, NotificationStatus, StatusCounts};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::retry::RetryPolicy;
use crate::store::{AttemptOutcome, NotificationStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, NotificationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim up to `limit` records matching `eligible`, oldest first.
    ///
    /// Runs under the store lock, so concurrent claimants see disjoint
    /// batches.
    async fn claim_matching<F>(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        eligible: F,
    ) -> Result<Vec<NotificationRecord>>
    where
        F: Fn(&NotificationRecord) -> bool,
    {
        let mut records = self.records.lock().await;

        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = records
            .values()
            .filter(|record| eligible(record))
            .map(|record| (record.created_at, record.id))
            .collect();
        candidates.sort();

        let mut claimed = Vec::new();
        for (_, id) in candidates.into_iter().take(limit as usize) {
            if let Some(record) = records.get_mut(&id) {
                record.status = NotificationStatus::Processing;
                record.attempt_count += 1;
                record.last_attempt_at = Some(now);
                record.updated_at = now;
                claimed.push(record.clone());
            }
        }

        Ok(claimed)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, user_id: i64, payload: Value) -> Result<NotificationRecord> {
        let now = Utc::now();
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            user_id,
            payload,
            status: NotificationStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        self.records.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<NotificationRecord>> {
        let records = self.records.lock().await;

        let mut matching: Vec<NotificationRecord> = records
            .values()
            .filter(|record| {
                filter.user_id.map_or(true, |user_id| record.user_id == user_id)
                    && filter.status.map_or(true, |status| record.status == status)
            })
            .cloned()
            .collect();

        // Newest first, id as tie-break for a stable order.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>> {
        self.claim_matching(limit, Utc::now(), |record| {
            record.status == NotificationStatus::Pending
        })
        .await
    }

    async fn claim_retryable(
        &self,
        limit: u32,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>> {
        self.claim_matching(limit, now, |record| {
            record.status == NotificationStatus::Failed && policy.is_eligible(record, now)
        })
        .await
    }

    async fn record_outcome(&self, id: Uuid, outcome: AttemptOutcome) -> Result<()> {
        let mut records = self.records.lock().await;

        let record = records.get_mut(&id).ok_or_else(|| {
            DispatchError::consistency(format!("notification {} not found", id))
        })?;

        if record.status != NotificationStatus::Processing {
            return Err(DispatchError::consistency(format!(
                "notification {} is {}, expected processing",
                id, record.status
            )));
        }

        match outcome {
            AttemptOutcome::Delivered => {
                record.status = NotificationStatus::Sent;
            }
            AttemptOutcome::Failed { error, exhausted } => {
                record.status = if exhausted {
                    NotificationStatus::RetryExhausted
                } else {
                    NotificationStatus::Failed
                };
                record.last_error = Some(error);
            }
        }
        record.updated_at = Utc::now();

        Ok(())
    }

    async fn mark_exhausted(&self, max_attempts: u32) -> Result<u64> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let mut parked = 0;

        for record in records.values_mut() {
            if record.status == NotificationStatus::Failed && record.attempt_count >= max_attempts {
                record.status = NotificationStatus::RetryExhausted;
                record.updated_at = now;
                parked += 1;
            }
        }

        Ok(parked)
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let mut reclaimed = 0;

        for record in records.values_mut() {
            if record.status == NotificationStatus::Processing
                && record.last_attempt_at.map_or(true, |at| at < cutoff)
            {
                record.status = NotificationStatus::Pending;
                record.updated_at = now;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let records = self.records.lock().await;
        let mut counts = StatusCounts::default();
        for record in records.values() {
            counts.add(record.status, 1);
        }
        Ok(counts)
    }
}
