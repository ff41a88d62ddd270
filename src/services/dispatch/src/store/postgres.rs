//! Postgres storage backend
//!
//! Claims run in a transaction: a `SELECT ... FOR UPDATE SKIP LOCKED`
//! picks the batch without blocking concurrent claimants, then a single
//! `UPDATE ... RETURNING` stamps the claim. Retry eligibility is
//! evaluated inside the claim query so ineligible records are never
//! touched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{
    NotificationFilter, NotificationRecord, NotificationStatus, StatusCounts,
};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{DispatchError, Result};
use crate::retry::RetryPolicy;
use crate::store::{AttemptOutcome, NotificationStore};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect, apply migrations, and return a ready store.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DispatchError::database(format!("migration failed: {}", e)))?;

        info!("Connected to Postgres and applied migrations");
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stamp the selected ids as claimed and return the updated rows.
    async fn mark_claimed(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'processing',
                attempt_count = attempt_count + 1,
                last_attempt_at = $2,
                updated_at = $2
            WHERE id = ANY($1)
            RETURNING id, user_id, payload, status, attempt_count,
                      last_attempt_at, last_error, created_at, updated_at
            "#,
        )
        .bind(ids)
        .bind(now)
        .fetch_all(&mut **tx)
        .await?;

        let mut records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;
        // UPDATE .. RETURNING does not guarantee an order.
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn create(&self, user_id: i64, payload: Value) -> Result<NotificationRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, payload, status, attempt_count, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $4)
            RETURNING id, user_id, payload, status, attempt_count,
                      last_attempt_at, last_error, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        record_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, payload, status, attempt_count,
                   last_attempt_at, last_error, created_at, updated_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self, filter: &NotificationFilter) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, payload, status, attempt_count,
                   last_attempt_at, last_error, created_at, updated_at
            FROM notifications
            WHERE ($1::bigint IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status.map(|status| status.as_str().to_string()))
        .bind(filter.effective_limit() as i64)
        .bind(filter.effective_offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn claim_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM notifications
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let records = Self::mark_claimed(&mut tx, &ids, Utc::now()).await?;
        tx.commit().await?;
        Ok(records)
    }

    async fn claim_retryable(
        &self,
        limit: u32,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>> {
        let mut tx = self.pool.begin().await?;

        // Same backoff formula as RetryPolicy::backoff_delay, evaluated
        // in SQL so ineligible rows are never locked.
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM notifications
            WHERE status = 'failed'
              AND attempt_count < $2
              AND (
                  last_attempt_at IS NULL
                  OR last_attempt_at + make_interval(
                      secs => LEAST(floor($3 * power($4, GREATEST(attempt_count - 1, 0))), $5)
                  ) <= $1
              )
            ORDER BY created_at ASC, id ASC
            LIMIT $6
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(policy.max_attempts as i32)
        .bind(policy.initial_delay_seconds as f64)
        .bind(policy.backoff_multiplier)
        .bind(policy.max_delay_seconds as f64)
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let records = Self::mark_claimed(&mut tx, &ids, now).await?;
        tx.commit().await?;
        Ok(records)
    }

    async fn record_outcome(&self, id: Uuid, outcome: AttemptOutcome) -> Result<()> {
        let (status, error) = match outcome {
            AttemptOutcome::Delivered => (NotificationStatus::Sent, None),
            AttemptOutcome::Failed { error, exhausted } => {
                let status = if exhausted {
                    NotificationStatus::RetryExhausted
                } else {
                    NotificationStatus::Failed
                };
                (status, Some(error))
            }
        };

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2,
                last_error = COALESCE($3, last_error),
                updated_at = $4
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM notifications WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(match current {
                Some(actual) => DispatchError::consistency(format!(
                    "notification {} is {}, expected processing",
                    id, actual
                )),
                None => DispatchError::consistency(format!("notification {} not found", id)),
            });
        }

        Ok(())
    }

    async fn mark_exhausted(&self, max_attempts: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'retry_exhausted', updated_at = $2
            WHERE status = 'failed' AND attempt_count >= $1
            "#,
        )
        .bind(max_attempts as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'pending', updated_at = $2
            WHERE status = 'processing'
              AND (last_attempt_at IS NULL OR last_attempt_at < $1)
            "#,
        )
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM notifications GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<NotificationStatus>() {
                Ok(status) => counts.add(status, count.max(0) as u64),
                Err(e) => warn!("Skipping unknown status in counts: {}", e),
            }
        }
        Ok(counts)
    }
}

fn record_from_row(row: &PgRow) -> Result<NotificationRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<NotificationStatus>()
        .map_err(|e| DispatchError::database(e.to_string()))?;
    let attempt_count: i32 = row.try_get("attempt_count")?;

    Ok(NotificationRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        payload: row.try_get("payload")?,
        status,
        attempt_count: attempt_count.max(0) as u32,
        last_attempt_at: row.try_get("last_attempt_at")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
