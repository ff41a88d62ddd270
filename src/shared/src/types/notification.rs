//! Notification record types shared across the Relay platform
//!
//! The record shape defined here is the contract between the dispatch
//! service, its storage backends, and API consumers. Status transitions
//! are owned by the dispatch service; everything else treats records as
//! read-only data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Lifecycle state of a notification.
///
/// `Sent` and `RetryExhausted` are terminal. `Processing` is transient and
/// only ever held while a worker owns the record; a crashed worker leaves
/// stale `Processing` records behind, which the reclaim sweep returns to
/// `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Created, never attempted.
    Pending,
    /// Claimed by a worker, attempt in flight.
    Processing,
    /// Delivered successfully. Terminal.
    Sent,
    /// Last attempt failed, may still be retried.
    Failed,
    /// Failed and out of attempts. Terminal.
    RetryExhausted,
}

impl NotificationStatus {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::RetryExhausted => "retry_exhausted",
        }
    }

    /// Terminal states are never picked up by any sweep again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::RetryExhausted)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown notification status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for NotificationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "retry_exhausted" => Ok(Self::RetryExhausted),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A single notification and its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: i64,
    /// Opaque payload supplied at creation. The dispatch service never
    /// interprets it; channel adapters may read well-known keys.
    pub payload: Value,
    pub status: NotificationStatus,
    /// Number of delivery attempts started so far. Incremented when a
    /// worker claims the record, never decremented.
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Reason for the most recent failed attempt, if any.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a notification.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    #[validate(range(min = 1, message = "user_id must be a positive integer"))]
    pub user_id: i64,
    #[validate(custom = "validate_payload")]
    pub payload: Value,
}

fn validate_payload(payload: &Value) -> Result<(), ValidationError> {
    let empty = match payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        let mut error = ValidationError::new("payload_empty");
        error.message = Some("payload must not be null or an empty string".into());
        return Err(error);
    }
    Ok(())
}

/// Query filter for listing notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub user_id: Option<i64>,
    pub status: Option<NotificationStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl NotificationFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&NotificationStatus::RetryExhausted).unwrap();
        assert_eq!(json, "\"retry_exhausted\"");

        let status: NotificationStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, NotificationStatus::Pending);
    }

    #[test]
    fn test_status_display_matches_as_str() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Processing,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
            NotificationStatus::RetryExhausted,
        ] {
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn test_status_round_trips_through_from_str() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Processing,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
            NotificationStatus::RetryExhausted,
        ] {
            let parsed: NotificationStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }

        assert!("delivered".parse::<NotificationStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(NotificationStatus::Sent.is_terminal());
        assert!(NotificationStatus::RetryExhausted.is_terminal());
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(!NotificationStatus::Processing.is_terminal());
        assert!(!NotificationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_create_request_accepts_valid_input() {
        let request = CreateNotificationRequest {
            user_id: 42,
            payload: json!({"subject": "hello", "body": "world"}),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_request_rejects_non_positive_user_id() {
        let request = CreateNotificationRequest {
            user_id: 0,
            payload: json!({"body": "hello"}),
        };
        assert!(request.validate().is_err());

        let request = CreateNotificationRequest {
            user_id: -7,
            payload: json!({"body": "hello"}),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_empty_payload() {
        let request = CreateNotificationRequest {
            user_id: 1,
            payload: Value::Null,
        };
        assert!(request.validate().is_err());

        let request = CreateNotificationRequest {
            user_id: 1,
            payload: json!("   "),
        };
        assert!(request.validate().is_err());

        // A non-empty string payload is opaque but valid.
        let request = CreateNotificationRequest {
            user_id: 1,
            payload: json!("plain text body"),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_filter_limit_clamping() {
        let filter = NotificationFilter::default();
        assert_eq!(filter.effective_limit(), NotificationFilter::DEFAULT_LIMIT);
        assert_eq!(filter.effective_offset(), 0);

        let filter = NotificationFilter {
            limit: Some(10_000),
            offset: Some(20),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), NotificationFilter::MAX_LIMIT);
        assert_eq!(filter.effective_offset(), 20);
    }
}
