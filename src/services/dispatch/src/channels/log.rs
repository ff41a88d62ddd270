//! Log-only delivery channel for development and tests

use async_trait::async_trait;
use relay_shared::NotificationRecord;
use tracing::info;

use crate::channels::{ChannelInfo, DeliveryChannel};
use crate::error::Result;

/// Writes each delivery to the log and reports success.
#[derive(Debug, Default)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<()> {
        info!(
            "Delivering notification {} for user {} (attempt {})",
            record.id, record.user_id, record.attempt_count
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: "log".to_string(),
            description: "Log-only delivery for development and tests".to_string(),
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

    #[tokio::test]
    async fn test_log_channel_always_delivers() {
        let now = Utc::now();
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            user_id: 42,
            payload: json!({"body": "hello"}),
            status: NotificationStatus::Processing,
            attempt_count: 1,
            last_attempt_at: Some(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        let channel = LogChannel::new();
        assert!(channel.send(&record).await.is_ok());
    }
}
