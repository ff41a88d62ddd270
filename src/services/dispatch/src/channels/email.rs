//! Email delivery channel
//!
//! Sends notifications over SMTP. Recipient addresses are derived from
//! the user id and a configured domain. The payload is opaque, but the
//! well-known keys `subject` and `body` are used when present; anything
//! else is sent as pretty-printed JSON.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use relay_shared::NotificationRecord;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::channels::{ChannelInfo, DeliveryChannel};
use crate::config::EmailChannelConfig;
use crate::error::{DispatchError, Result};

pub struct EmailChannel {
    config: EmailChannelConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
}

impl EmailChannel {
    pub async fn new(config: EmailChannelConfig) -> Result<Self> {
        let mut builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host).map_err(|e| {
                DispatchError::configuration(format!("SMTP relay setup failed: {}", e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        builder = builder.port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        let transport = builder
            .pool_config(PoolConfig::new().max_size(10).min_idle(2))
            .timeout(Some(Duration::from_secs(config.timeout_seconds)))
            .build();

        let from_mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::configuration(format!("invalid from address: {}", e)))?;

        Ok(Self {
            config,
            transport,
            from_mailbox,
        })
    }

    fn recipient_for(&self, record: &NotificationRecord) -> Result<Mailbox> {
        format!("user-{}@{}", record.user_id, self.config.recipient_domain)
            .parse::<Mailbox>()
            .map_err(|e| {
                DispatchError::delivery(format!(
                    "could not derive recipient for user {}: {}",
                    record.user_id, e
                ))
            })
    }

    fn build_message(&self, record: &NotificationRecord) -> Result<Message> {
        let subject = record
            .payload
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or("Notification")
            .to_string();

        let body = match record.payload.get("body").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => serde_json::to_string_pretty(&record.payload)?,
        };

        Message::builder()
            .from(self.from_mailbox.clone())
            .to(self.recipient_for(record)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| DispatchError::delivery(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<()> {
        let message = self.build_message(record)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::delivery(format!("SMTP send failed: {}", e)))?;

        debug!("Sent notification {} via SMTP", record.id);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.transport.test_connection().await.unwrap_or(false))
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: "email".to_string(),
            description: "SMTP delivery with recipient addresses derived from user ids"
                .to_string(),
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

    fn test_config() -> EmailChannelConfig {
        EmailChannelConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_tls: false,
            from_email: "notifications@relay-platform.dev".to_string(),
            from_name: "Relay Notifications".to_string(),
            recipient_domain: "relay-platform.dev".to_string(),
            timeout_seconds: 5,
        }
    }

    fn test_record(payload: Value) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: 42,
            payload,
            status: NotificationStatus::Processing,
            attempt_count: 1,
            last_attempt_at: Some(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_channel_creation_without_tls() {
        let channel = EmailChannel::new(test_config()).await;
        assert!(channel.is_ok());
    }

    #[tokio::test]
    async fn test_build_message_uses_well_known_keys() {
        let channel = EmailChannel::new(test_config()).await.unwrap();
        let record = test_record(json!({"subject": "Order shipped", "body": "On its way"}));

        let message = channel.build_message(&record);
        assert!(message.is_ok());

        let formatted = String::from_utf8(message.unwrap().formatted()).unwrap();
        assert!(formatted.contains("Order shipped"));
        assert!(formatted.contains("user-42@relay-platform.dev"));
    }

    #[tokio::test]
    async fn test_build_message_falls_back_to_json_body() {
        let channel = EmailChannel::new(test_config()).await.unwrap();
        let record = test_record(json!({"kind": "digest", "items": [1, 2, 3]}));

        let message = channel.build_message(&record).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("digest"));
    }

    #[tokio::test]
    async fn test_recipient_derived_from_user_id() {
        let channel = EmailChannel::new(test_config()).await.unwrap();
        let record = test_record(json!({"body": "hello"}));

        let mailbox = channel.recipient_for(&record).unwrap();
        assert_eq!(mailbox.email.to_string(), "user-42@relay-platform.dev");
    }
}
