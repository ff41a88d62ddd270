//! Delivery channel adapters
//!
//! A channel turns one notification record into one delivery attempt.
//! The engine treats channels as opaque: any error is a failed attempt,
//! and an adapter may see the same record again on retry, so delivery is
//! at-least-once by contract.

#[cfg(feature = "email")]
pub mod email;
pub mod log;
pub mod webhook;

#[cfg(feature = "email")]
pub use email::EmailChannel;
pub use log::LogChannel;
pub use webhook::WebhookChannel;

use async_trait::async_trait;
use relay_shared::NotificationRecord;
use std::sync::Arc;

use crate::config::{ChannelConfig, ChannelKind};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Attempt delivery of one notification.
    async fn send(&self, record: &NotificationRecord) -> Result<()>;

    /// Whether the channel is currently able to deliver.
    async fn health_check(&self) -> Result<bool>;

    fn info(&self) -> ChannelInfo;
}

/// Build the delivery channel selected by configuration.
pub async fn build_channel(config: &ChannelConfig) -> Result<Arc<dyn DeliveryChannel>> {
    match config.kind {
        ChannelKind::Log => Ok(Arc::new(LogChannel::new())),
        ChannelKind::Webhook => Ok(Arc::new(
            WebhookChannel::new(config.webhook.clone()).await?,
        )),
        ChannelKind::Email => {
            #[cfg(feature = "email")]
            {
                Ok(Arc::new(EmailChannel::new(config.email.clone()).await?))
            }
            #[cfg(not(feature = "email"))]
            {
                Err(crate::error::DispatchError::configuration(
                    "email channel requested but the service was built without the email feature",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_channel_defaults_to_log() {
        let config = ChannelConfig::default();
        let channel = build_channel(&config).await.unwrap();
        assert_eq!(channel.info().name, "log");
        assert!(channel.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_build_channel_webhook() {
        let mut config = ChannelConfig::default();
        config.kind = ChannelKind::Webhook;
        config.webhook.endpoint_url = "https://hooks.example.com/relay".to_string();

        let channel = build_channel(&config).await.unwrap();
        assert_eq!(channel.info().name, "webhook");
    }
}
