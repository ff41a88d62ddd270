//! Retry eligibility and backoff policy
//!
//! Backoff is deterministic exponential: the delay after attempt `n` is
//! `initial * multiplier^(n-1)`, capped at the configured maximum. A
//! failed record becomes eligible again once that delay has elapsed since
//! its last attempt, and only while it still has attempts left.

use chrono::{DateTime, Duration, Utc};
use relay_shared::NotificationRecord;

use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub backoff_multiplier: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay_seconds: config.initial_delay_seconds,
            max_delay_seconds: config.max_delay_seconds,
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Delay required after `attempt_count` attempts before the next one.
    ///
    /// The same inputs always produce the same delay, so eligibility can
    /// be evaluated identically in SQL and in process memory.
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        if attempt_count == 0 {
            return Duration::zero();
        }

        let exponent = attempt_count.saturating_sub(1) as i32;
        let delay = (self.initial_delay_seconds as f64
            * self.backoff_multiplier.powi(exponent)) as u64;
        Duration::seconds(delay.min(self.max_delay_seconds) as i64)
    }

    /// Whether the record has used up its attempt budget.
    pub fn exhausts(&self, attempt_count: u32) -> bool {
        attempt_count >= self.max_attempts
    }

    /// Whether a failed record may be retried at `now`.
    pub fn is_eligible(&self, record: &NotificationRecord, now: DateTime<Utc>) -> bool {
        if self.exhausts(record.attempt_count) {
            return false;
        }

        match record.last_attempt_at {
            Some(last_attempt) => now - last_attempt >= self.backoff_delay(record.attempt_count),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_shared::NotificationStatus;
    use serde_json::json;
    use uuid::Uuid;

    fn policy(initial: u64, max: u64, multiplier: f64, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_seconds: initial,
            max_delay_seconds: max,
            backoff_multiplier: multiplier,
        }
    }

    fn failed_record(attempt_count: u32, last_attempt_at: Option<DateTime<Utc>>) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: 42,
            payload: json!({"body": "hello"}),
            status: NotificationStatus::Failed,
            attempt_count,
            last_attempt_at,
            last_error: Some("connection refused".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = policy(60, 3600, 2.0, 5);
        assert_eq!(policy.backoff_delay(1), Duration::seconds(60));
        assert_eq!(policy.backoff_delay(2), Duration::seconds(120));
        assert_eq!(policy.backoff_delay(3), Duration::seconds(240));
        assert_eq!(policy.backoff_delay(4), Duration::seconds(480));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy(60, 300, 2.0, 10);
        assert_eq!(policy.backoff_delay(3), Duration::seconds(240));
        assert_eq!(policy.backoff_delay(4), Duration::seconds(300));
        assert_eq!(policy.backoff_delay(9), Duration::seconds(300));
    }

    #[test]
    fn test_backoff_is_deterministic() {
        let policy = policy(30, 3600, 2.5, 5);
        for attempt in 1..6 {
            assert_eq!(policy.backoff_delay(attempt), policy.backoff_delay(attempt));
        }
    }

    #[test]
    fn test_zero_attempts_need_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::zero());
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = policy(60, 3600, 2.0, 3);
        assert!(!policy.exhausts(2));
        assert!(policy.exhausts(3));
        assert!(policy.exhausts(4));
    }

    #[test]
    fn test_eligibility_respects_backoff_window() {
        let policy = policy(60, 3600, 2.0, 3);
        let now = Utc::now();

        let too_recent = failed_record(1, Some(now - Duration::seconds(10)));
        assert!(!policy.is_eligible(&too_recent, now));

        let old_enough = failed_record(1, Some(now - Duration::seconds(61)));
        assert!(policy.is_eligible(&old_enough, now));
    }

    #[test]
    fn test_eligibility_denied_after_exhaustion() {
        let policy = policy(0, 3600, 2.0, 3);
        let now = Utc::now();

        let spent = failed_record(3, Some(now - Duration::seconds(86_400)));
        assert!(!policy.is_eligible(&spent, now));
    }

    #[test]
    fn test_record_without_attempts_is_immediately_eligible() {
        let policy = policy(60, 3600, 2.0, 3);
        let record = failed_record(0, None);
        assert!(policy.is_eligible(&record, Utc::now()));
    }
}
