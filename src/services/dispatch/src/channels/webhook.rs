//! Webhook delivery channel
//!
//! Posts each notification as a JSON envelope to a configured endpoint.
//! Any non-2xx response is a failed attempt.

use async_trait::async_trait;
use relay_shared::NotificationRecord;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::channels::{ChannelInfo, DeliveryChannel};
use crate::config::WebhookChannelConfig;
use crate::error::{DispatchError, Result};

pub struct WebhookChannel {
    config: WebhookChannelConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub async fn new(config: WebhookChannelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| {
                DispatchError::configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn build_envelope(record: &NotificationRecord) -> Value {
        json!({
            "id": record.id,
            "user_id": record.user_id,
            "payload": record.payload,
            "attempt": record.attempt_count,
            "created_at": record.created_at,
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<()> {
        debug!(
            "Posting notification {} to {}",
            record.id, self.config.endpoint_url
        );

        let response = self
            .client
            .post(&self.config.endpoint_url)
            .header("Content-Type", "application/json")
            .json(&Self::build_envelope(record))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(
                "Webhook delivery for {} returned {}",
                record.id,
                response.status()
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::delivery(format!("HTTP {} - {}", status, body)))
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.config.endpoint_url.is_empty())
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: "webhook".to_string(),
            description: "POST notifications to a configured HTTP endpoint".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_shared::NotificationStatus;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint_url: String) -> WebhookChannelConfig {
        WebhookChannelConfig {
            endpoint_url,
            timeout_seconds: 5,
            user_agent: "Relay-Dispatch-Test/1.0".to_string(),
            verify_ssl: true,
        }
    }

    fn test_record() -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id: Uuid::new_v4(),
            user_id: 42,
            payload: json!({"subject": "hello", "body": "world"}),
            status: NotificationStatus::Processing,
            attempt_count: 1,
            last_attempt_at: Some(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_send_posts_envelope_and_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/relay"))
            .and(body_partial_json(json!({"user_id": 42, "attempt": 1})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(test_config(format!("{}/hooks/relay", server.uri())))
            .await
            .unwrap();

        assert!(channel.send(&test_record()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(test_config(server.uri()))
            .await
            .unwrap();

        let err = channel.send(&test_record()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("HTTP 500"));
        assert!(message.contains("upstream down"));
    }

    #[tokio::test]
    async fn test_envelope_carries_record_fields() {
        let record = test_record();
        let envelope = WebhookChannel::build_envelope(&record);

        assert_eq!(envelope["id"], json!(record.id));
        assert_eq!(envelope["user_id"], json!(42));
        assert_eq!(envelope["attempt"], json!(1));
        assert_eq!(envelope["payload"]["subject"], json!("hello"));
    }
}
