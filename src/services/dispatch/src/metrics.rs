//! Metrics collection for the dispatch service
//!
//! Tracks notification creation, delivery attempts by outcome, retry
//! exhaustion, job trigger dispositions, and reclaim activity, plus a
//! per-status record gauge refreshed after each sweep.

use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use relay_shared::{JobKind, StatusCounts};
use std::sync::Arc;
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::{DispatchError, Result};

#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Arc<Registry>,

    // Counters
    notifications_created: IntCounter,
    delivery_attempts: IntCounterVec,
    notifications_exhausted: IntCounter,
    job_triggers: IntCounterVec,
    records_reclaimed: IntCounter,

    // Gauges
    records_by_status: IntGaugeVec,

    // Histograms
    attempt_duration: Histogram,
}

impl DispatchMetrics {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        let registry = Registry::new();

        let notifications_created = IntCounter::with_opts(
            prometheus::Opts::new(
                "notifications_created_total",
                "Total number of notifications accepted for dispatch",
            )
            .namespace(&config.namespace),
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create notifications_created: {}", e))
        })?;

        let delivery_attempts = IntCounterVec::new(
            prometheus::Opts::new(
                "delivery_attempts_total",
                "Total number of delivery attempts by outcome",
            )
            .namespace(&config.namespace),
            &["outcome"],
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create delivery_attempts: {}", e))
        })?;

        let notifications_exhausted = IntCounter::with_opts(
            prometheus::Opts::new(
                "notifications_exhausted_total",
                "Total number of notifications parked after exhausting retries",
            )
            .namespace(&config.namespace),
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create notifications_exhausted: {}", e))
        })?;

        let job_triggers = IntCounterVec::new(
            prometheus::Opts::new(
                "job_triggers_total",
                "Job triggers by kind and disposition (started or coalesced)",
            )
            .namespace(&config.namespace),
            &["job", "disposition"],
        )
        .map_err(|e| DispatchError::internal(format!("Failed to create job_triggers: {}", e)))?;

        let records_reclaimed = IntCounter::with_opts(
            prometheus::Opts::new(
                "records_reclaimed_total",
                "Total number of stale processing records returned to pending",
            )
            .namespace(&config.namespace),
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create records_reclaimed: {}", e))
        })?;

        let records_by_status = IntGaugeVec::new(
            prometheus::Opts::new("records_by_status", "Number of records per status")
                .namespace(&config.namespace),
            &["status"],
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create records_by_status: {}", e))
        })?;

        let attempt_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "delivery_attempt_duration_seconds",
                "Wall-clock duration of delivery attempts",
            )
            .namespace(&config.namespace)
            .buckets(config.histogram_buckets.clone()),
        )
        .map_err(|e| {
            DispatchError::internal(format!("Failed to create attempt_duration: {}", e))
        })?;

        registry
            .register(Box::new(notifications_created.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register notifications_created: {}", e))
            })?;
        registry
            .register(Box::new(delivery_attempts.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register delivery_attempts: {}", e))
            })?;
        registry
            .register(Box::new(notifications_exhausted.clone()))
            .map_err(|e| {
                DispatchError::internal(format!(
                    "Failed to register notifications_exhausted: {}",
                    e
                ))
            })?;
        registry
            .register(Box::new(job_triggers.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register job_triggers: {}", e))
            })?;
        registry
            .register(Box::new(records_reclaimed.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register records_reclaimed: {}", e))
            })?;
        registry
            .register(Box::new(records_by_status.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register records_by_status: {}", e))
            })?;
        registry
            .register(Box::new(attempt_duration.clone()))
            .map_err(|e| {
                DispatchError::internal(format!("Failed to register attempt_duration: {}", e))
            })?;

        info!("Dispatch metrics initialized");

        Ok(Self {
            registry: Arc::new(registry),
            notifications_created,
            delivery_attempts,
            notifications_exhausted,
            job_triggers,
            records_reclaimed,
            records_by_status,
            attempt_duration,
        })
    }

    pub fn record_created(&self) {
        self.notifications_created.inc();
    }

    /// Record one delivery attempt with its duration in seconds.
    pub fn record_attempt(&self, outcome: &str, duration_seconds: f64) {
        self.delivery_attempts.with_label_values(&[outcome]).inc();
        self.attempt_duration.observe(duration_seconds);
    }

    pub fn record_exhausted(&self, count: u64) {
        self.notifications_exhausted.inc_by(count);
    }

    pub fn record_trigger(&self, job: JobKind, coalesced: bool) {
        let disposition = if coalesced { "coalesced" } else { "started" };
        self.job_triggers
            .with_label_values(&[job.as_str(), disposition])
            .inc();
    }

    pub fn record_reclaimed(&self, count: u64) {
        self.records_reclaimed.inc_by(count);
    }

    pub fn set_status_counts(&self, counts: &StatusCounts) {
        self.records_by_status
            .with_label_values(&["pending"])
            .set(counts.pending as i64);
        self.records_by_status
            .with_label_values(&["processing"])
            .set(counts.processing as i64);
        self.records_by_status
            .with_label_values(&["sent"])
            .set(counts.sent as i64);
        self.records_by_status
            .with_label_values(&["failed"])
            .set(counts.failed as i64);
        self.records_by_status
            .with_label_values(&["retry_exhausted"])
            .set(counts.retry_exhausted as i64);
    }

    /// Export metrics in Prometheus text format.
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| DispatchError::internal(format!("Failed to encode metrics: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> MetricsConfig {
        MetricsConfig {
            enabled: true,
            namespace: "test_relay_dispatch".to_string(),
            histogram_buckets: vec![0.01, 0.1, 1.0, 10.0],
        }
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = DispatchMetrics::new(&create_test_config());
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_export_contains_recorded_attempts() {
        let metrics = DispatchMetrics::new(&create_test_config()).unwrap();

        metrics.record_created();
        metrics.record_attempt("delivered", 0.05);
        metrics.record_attempt("failed", 1.2);

        let exported = metrics.export_metrics().unwrap();
        assert!(exported.contains("test_relay_dispatch_notifications_created_total"));
        assert!(exported.contains("test_relay_dispatch_delivery_attempts_total"));
        assert!(exported.contains("outcome=\"delivered\""));
        assert!(exported.contains("outcome=\"failed\""));
    }

    #[test]
    fn test_trigger_dispositions_are_labelled() {
        let metrics = DispatchMetrics::new(&create_test_config()).unwrap();

        metrics.record_trigger(JobKind::ProcessPending, false);
        metrics.record_trigger(JobKind::ProcessPending, true);
        metrics.record_trigger(JobKind::RetryFailed, false);

        let exported = metrics.export_metrics().unwrap();
        assert!(exported.contains("job=\"process_pending\""));
        assert!(exported.contains("disposition=\"coalesced\""));
        assert!(exported.contains("job=\"retry_failed\""));
    }

    #[test]
    fn test_status_gauges_follow_counts() {
        let metrics = DispatchMetrics::new(&create_test_config()).unwrap();

        let mut counts = StatusCounts::default();
        counts.pending = 4;
        counts.retry_exhausted = 2;
        metrics.set_status_counts(&counts);

        let exported = metrics.export_metrics().unwrap();
        assert!(exported.contains("status=\"pending\""));
        assert!(exported.contains("status=\"retry_exhausted\""));
    }
}
