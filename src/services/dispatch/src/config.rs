//! Configuration for the dispatch service
//!
//! Configuration is layered: struct defaults first, then environment
//! variables prefixed with `RELAY` (nested fields separated by `__`,
//! e.g. `RELAY_RETRY__MAX_ATTEMPTS`), then an optional config file named
//! by `RELAY_CONFIG_FILE`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DispatchError, Result};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub sweeper: SweeperConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
        }
    }
}

/// Storage backend selection. With `enabled = false` the service keeps
/// records in process memory, which is the development default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/relay".to_string()),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Log-only delivery, for development and tests.
    Log,
    Webhook,
    Email,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    pub webhook: WebhookChannelConfig,
    pub email: EmailChannelConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind: ChannelKind::Log,
            webhook: WebhookChannelConfig::default(),
            email: EmailChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub endpoint_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub verify_ssl: bool,
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            endpoint_url: std::env::var("WEBHOOK_ENDPOINT_URL").unwrap_or_default(),
            timeout_seconds: 30,
            user_agent: "Relay-Dispatch/1.0".to_string(),
            verify_ssl: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    /// Domain used to derive recipient addresses from user ids.
    pub recipient_domain: String,
    pub timeout_seconds: u64,
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_use_tls: true,
            from_email: "notifications@relay-platform.dev".to_string(),
            from_name: "Relay Notifications".to_string(),
            recipient_domain: "relay-platform.dev".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum records claimed per batch.
    pub batch_size: u32,
    /// Wall-clock budget for a single delivery attempt.
    pub attempt_timeout_seconds: u64,
    /// Age after which a processing record is considered abandoned and
    /// reclaimed to pending. Must exceed the attempt timeout.
    pub visibility_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            attempt_timeout_seconds: 30,
            visibility_timeout_seconds: 300,
        }
    }
}

impl WorkerConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }

    pub fn visibility_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.visibility_timeout_seconds as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
    pub max_delay_seconds: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 60,
            max_delay_seconds: 3600,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub pending_interval_seconds: u64,
    pub retry_interval_seconds: u64,
    pub reclaim_interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_interval_seconds: 30,
            retry_interval_seconds: 60,
            reclaim_interval_seconds: 60,
        }
    }
}

impl SweeperConfig {
    pub fn pending_interval(&self) -> Duration {
        Duration::from_secs(self.pending_interval_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub namespace: String,
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "relay_dispatch".to_string(),
            histogram_buckets: vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            channel: ChannelConfig::default(),
            worker: WorkerConfig::default(),
            retry: RetryConfig::default(),
            sweeper: SweeperConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from defaults, environment, and an optional
    /// config file named by `RELAY_CONFIG_FILE`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = config::Config::builder();

        cfg = cfg.add_source(config::Config::try_from(&DispatchConfig::default())?);

        cfg = cfg.add_source(
            config::Environment::with_prefix("RELAY")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(config_file) = std::env::var("RELAY_CONFIG_FILE") {
            cfg = cfg.add_source(config::File::with_name(&config_file).required(false));
        }

        let config: DispatchConfig = cfg.build()?.try_deserialize()?;
        config.validate().map_err(DispatchError::configuration)?;
        Ok(config)
    }

    /// Validate cross-field constraints. Returns a human-readable message
    /// for the first violation found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be non-zero".to_string());
        }

        if self.database.enabled && self.database.url.is_empty() {
            return Err("Database URL must be set when the database is enabled".to_string());
        }

        if self.retry.max_attempts == 0 {
            return Err("Max retry attempts must be greater than 0".to_string());
        }

        if self.retry.backoff_multiplier <= 1.0 {
            return Err("Backoff multiplier must be greater than 1.0".to_string());
        }

        if self.retry.max_delay_seconds < self.retry.initial_delay_seconds {
            return Err("Max retry delay must not be smaller than the initial delay".to_string());
        }

        if self.worker.batch_size == 0 {
            return Err("Worker batch size must be greater than 0".to_string());
        }

        if self.worker.attempt_timeout_seconds == 0 {
            return Err("Attempt timeout must be greater than 0".to_string());
        }

        if self.worker.visibility_timeout_seconds <= self.worker.attempt_timeout_seconds {
            return Err("Visibility timeout must exceed the attempt timeout".to_string());
        }

        if self.sweeper.enabled
            && (self.sweeper.pending_interval_seconds == 0
                || self.sweeper.retry_interval_seconds == 0
                || self.sweeper.reclaim_interval_seconds == 0)
        {
            return Err("Sweeper intervals must be greater than 0 when enabled".to_string());
        }

        if self.channel.kind == ChannelKind::Webhook && self.channel.webhook.endpoint_url.is_empty()
        {
            return Err("Webhook endpoint URL must be set for the webhook channel".to_string());
        }

        if self.channel.kind == ChannelKind::Email && self.channel.email.from_email.is_empty() {
            return Err("From address must be set for the email channel".to_string());
        }

        if self.metrics.enabled && self.metrics.histogram_buckets.is_empty() {
            return Err("Histogram buckets must not be empty when metrics are enabled".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = DispatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.worker.batch_size, 100);
        assert_eq!(config.channel.kind, ChannelKind::Log);
    }

    #[test]
    fn test_validate_rejects_zero_max_attempts() {
        let mut config = DispatchConfig::default();
        config.retry.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("Max retry attempts"));
    }

    #[test]
    fn test_validate_rejects_flat_backoff() {
        let mut config = DispatchConfig::default();
        config.retry.backoff_multiplier = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_visibility_timeout() {
        let mut config = DispatchConfig::default();
        config.worker.visibility_timeout_seconds = config.worker.attempt_timeout_seconds;
        let err = config.validate().unwrap_err();
        assert!(err.contains("Visibility timeout"));
    }

    #[test]
    fn test_validate_requires_webhook_url_for_webhook_channel() {
        let mut config = DispatchConfig::default();
        config.channel.kind = ChannelKind::Webhook;
        config.channel.webhook.endpoint_url = String::new();
        assert!(config.validate().is_err());

        config.channel.webhook.endpoint_url = "https://hooks.example.com/relay".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_helpers() {
        let config = SweeperConfig::default();
        assert_eq!(config.pending_interval(), Duration::from_secs(30));
        assert_eq!(config.retry_interval(), Duration::from_secs(60));

        let worker = WorkerConfig::default();
        assert_eq!(worker.attempt_timeout(), Duration::from_secs(30));
        assert_eq!(worker.visibility_timeout(), chrono::Duration::seconds(300));
    }

    #[test]
    fn test_channel_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ChannelKind::Webhook).unwrap(),
            "\"webhook\""
        );
        let kind: ChannelKind = serde_json::from_str("\"log\"").unwrap();
        assert_eq!(kind, ChannelKind::Log);
    }

    #[test]
    #[serial]
    fn test_from_env_applies_overrides() {
        std::env::set_var("RELAY_SERVER__PORT", "9099");
        std::env::set_var("RELAY_RETRY__MAX_ATTEMPTS", "5");

        let config = DispatchConfig::from_env().unwrap();
        assert_eq!(config.server.port, 9099);
        assert_eq!(config.retry.max_attempts, 5);

        std::env::remove_var("RELAY_SERVER__PORT");
        std::env::remove_var("RELAY_RETRY__MAX_ATTEMPTS");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_overrides() {
        std::env::set_var("RELAY_RETRY__MAX_ATTEMPTS", "0");

        let result = DispatchConfig::from_env();
        assert!(result.is_err());

        std::env::remove_var("RELAY_RETRY__MAX_ATTEMPTS");
    }
}
