//! Background sweeper
//!
//! Periodic loops that keep the engine moving without external triggers:
//! a pending sweep, a retry sweep, and a reclaim pass. Timer ticks go
//! through the same single-flight triggers as the admin endpoints, so a
//! timer tick and an admin trigger can never run the same job kind
//! concurrently.

use relay_shared::JobKind;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SweeperConfig;
use crate::controller::JobController;
use crate::error::Result;

#[derive(Clone)]
pub struct BackgroundSweeper {
    config: SweeperConfig,
    controller: Arc<JobController>,
    task_handles: Arc<RwLock<Vec<JoinHandle<()>>>>,
    is_running: Arc<RwLock<bool>>,
    shutdown: Arc<RwLock<Option<CancellationToken>>>,
}

impl BackgroundSweeper {
    pub fn new(config: SweeperConfig, controller: Arc<JobController>) -> Self {
        Self {
            config,
            controller,
            task_handles: Arc::new(RwLock::new(Vec::new())),
            is_running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn the sweep loops. Idempotent; a second call is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            warn!("Background sweeper is already running");
            return Ok(());
        }

        if !self.config.enabled {
            info!("Background sweeper disabled by configuration");
            return Ok(());
        }

        info!(
            "Starting background sweeper (pending every {}s, retry every {}s, reclaim every {}s)",
            self.config.pending_interval_seconds,
            self.config.retry_interval_seconds,
            self.config.reclaim_interval_seconds
        );

        let token = CancellationToken::new();
        let mut handles = self.task_handles.write().await;

        // Pending dispatch loop.
        {
            let controller = self.controller.clone();
            let token = token.clone();
            let period = self.config.pending_interval();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            controller.trigger(JobKind::ProcessPending);
                        }
                        _ = token.cancelled() => {
                            info!("Pending sweep loop shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        // Retry loop.
        {
            let controller = self.controller.clone();
            let token = token.clone();
            let period = self.config.retry_interval();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            controller.trigger(JobKind::RetryFailed);
                        }
                        _ = token.cancelled() => {
                            info!("Retry sweep loop shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        // Reclaim loop for abandoned processing records.
        {
            let controller = self.controller.clone();
            let token = token.clone();
            let period = self.config.reclaim_interval();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = controller.reclaim_stale().await {
                                error!("Reclaim pass failed: {}", e);
                            }
                        }
                        _ = token.cancelled() => {
                            info!("Reclaim loop shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        *self.shutdown.write().await = Some(token);
        *is_running = true;
        info!("Background sweeper started");
        Ok(())
    }

    /// Cancel the loops and wait for them to wind down.
    pub async fn stop(&self) -> Result<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!("Stopping background sweeper");

        if let Some(token) = self.shutdown.write().await.take() {
            token.cancel();
        }

        let mut handles = self.task_handles.write().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        *is_running = false;
        info!("Background sweeper stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}
