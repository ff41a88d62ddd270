//! Main binary for the Relay Dispatch Service
//!
//! This service accepts notifications over HTTP and delivers them through a
//! configured channel with retry and exhaustion handling:
//! - Notification intake with validation
//! - Batch dispatch with crash-safe attempt accounting
//! - Exponential backoff retries and an exhaustion parking lot
//! - Stale record reclaim after worker crashes
//! - Prometheus metrics and health reporting

use relay_dispatch::{DispatchConfig, DispatchService};

use anyhow::Context;
use clap::{Arg, Command};
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let matches = create_cli().get_matches();

    // Initialize tracing
    init_tracing(matches.get_one::<String>("log-level"));

    // Load configuration
    let config = load_config(&matches)?;

    info!("Starting Relay Dispatch Service");
    info!(
        "Configuration: Server {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Delivery channel: {:?}, storage: {}",
        config.channel.kind,
        if config.database.enabled {
            "postgres"
        } else {
            "memory"
        }
    );
    info!(
        "Retry budget: {} attempts, backoff {}s..{}s x{}",
        config.retry.max_attempts,
        config.retry.initial_delay_seconds,
        config.retry.max_delay_seconds,
        config.retry.backoff_multiplier
    );

    // Create cancellation token for graceful shutdown
    let cancellation_token = CancellationToken::new();

    // Initialize the dispatch service
    let service = DispatchService::new(config.clone()).await.map_err(|e| {
        error!("Failed to initialize dispatch service: {}", e);
        anyhow::anyhow!(e)
    })?;

    // Start background sweeper if enabled
    if config.sweeper.enabled {
        if let Err(e) = service.start().await {
            warn!(
                "Failed to start background sweeper: {}, continuing without it",
                e
            );
        }
    }

    // Create router
    let app = service.router();

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        anyhow::anyhow!(e)
    })?;

    info!("Dispatch service started successfully on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);
    info!("API: http://{}/api/v1/notifications", addr);

    // Start server with graceful shutdown
    let server_task = tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            let server = axum::serve(listener, app);

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Server shutdown requested");
                }
            }
        }
    });

    // Wait for shutdown signal
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    cancellation_token.cancel();

    // Stop background sweeper
    if let Err(e) = service.shutdown().await {
        warn!("Failed to stop background sweeper gracefully: {}", e);
    }

    // Wait for server to shutdown
    if let Err(e) = server_task.await {
        error!("Server task error during shutdown: {}", e);
    }

    info!("Relay Dispatch Service stopped gracefully");
    Ok(())
}

/// Initialize tracing/logging
///
/// An explicit `--log-level` wins over `RUST_LOG`, matching the CLI-over-env
/// precedence used for the server address.
fn init_tracing(level: Option<&String>) {
    let env_filter = match level {
        Some(level) => EnvFilter::new(format!(
            "relay_dispatch={},tower_http=info,axum=info,sqlx=warn",
            level
        )),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "relay_dispatch=info,tower_http=info,axum=info,sqlx=warn".into()),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("relay-dispatch-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Relay Dispatch Service - notification delivery with retries")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
}

/// Load configuration from file and environment, then apply CLI overrides
fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<DispatchConfig> {
    let mut config = if let Some(config_file) = matches.get_one::<String>("config") {
        info!("Loading configuration from file: {}", config_file);
        std::env::set_var("RELAY_CONFIG_FILE", config_file);
        DispatchConfig::from_env().context("Failed to load configuration from file")?
    } else {
        DispatchConfig::from_env().unwrap_or_else(|e| {
            warn!(
                "Failed to load configuration from environment: {}, using defaults",
                e
            );
            DispatchConfig::default()
        })
    };

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    if let Some(port_str) = matches.get_one::<String>("port") {
        config.server.port = port_str
            .parse()
            .with_context(|| format!("Invalid port number '{}'", port_str))?;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_create_cli() {
        let cli = create_cli();
        let matches = cli.try_get_matches_from(vec![
            "relay-dispatch-server",
            "--port",
            "9090",
            "--log-level",
            "debug",
        ]);
        assert!(matches.is_ok());

        let matches = matches.unwrap();
        assert_eq!(matches.get_one::<String>("port"), Some(&"9090".to_string()));
        assert_eq!(
            matches.get_one::<String>("log-level"),
            Some(&"debug".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        let cli = create_cli();
        let matches = cli.get_matches_from(vec!["relay-dispatch-server"]);

        let config = load_config(&matches).unwrap();
        assert_eq!(config.server.port, 8085);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    #[serial]
    fn test_load_config_with_overrides() {
        let cli = create_cli();
        let matches = cli.get_matches_from(vec![
            "relay-dispatch-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9999",
        ]);

        let config = load_config(&matches).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        let cli = create_cli();
        let matches = cli.get_matches_from(vec!["relay-dispatch-server", "--port", "invalid"]);

        let config = load_config(&matches);
        assert!(config.is_err());
    }

    #[test]
    #[serial]
    fn test_config_file_flag_is_applied() {
        let path = std::env::temp_dir().join("relay_dispatch_main_test.toml");
        std::fs::write(&path, "[server]\nport = 9191\n").unwrap();

        let cli = create_cli();
        let matches = cli.get_matches_from(vec![
            "relay-dispatch-server",
            "--config",
            path.to_str().unwrap(),
        ]);

        let config = load_config(&matches).unwrap();
        assert_eq!(config.server.port, 9191);

        std::env::remove_var("RELAY_CONFIG_FILE");
        let _ = std::fs::remove_file(&path);
    }
}
