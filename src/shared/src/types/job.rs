//! Background job vocabulary for the dispatch service

use serde::{Deserialize, Serialize};

use crate::types::notification::NotificationStatus;

/// The two sweep jobs the dispatch service runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Claim pending notifications and attempt first delivery.
    ProcessPending,
    /// Re-queue failed notifications whose backoff has elapsed.
    RetryFailed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessPending => "process_pending",
            Self::RetryFailed => "retry_failed",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acknowledgement returned by job trigger endpoints.
///
/// Triggers always return immediately. `coalesced` is true when a run of
/// the same kind was already in flight and the trigger folded into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAck {
    pub accepted: bool,
    pub job: JobKind,
    pub coalesced: bool,
}

impl TriggerAck {
    pub fn started(job: JobKind) -> Self {
        Self {
            accepted: true,
            job,
            coalesced: false,
        }
    }

    pub fn coalesced(job: JobKind) -> Self {
        Self {
            accepted: true,
            job,
            coalesced: true,
        }
    }
}

/// Record counts per status, used by health reporting and gauges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
    pub retry_exhausted: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: NotificationStatus, count: u64) {
        match status {
            NotificationStatus::Pending => self.pending += count,
            NotificationStatus::Processing => self.processing += count,
            NotificationStatus::Sent => self.sent += count,
            NotificationStatus::Failed => self.failed += count,
            NotificationStatus::RetryExhausted => self.retry_exhausted += count,
        }
    }

    pub fn get(&self, status: NotificationStatus) -> u64 {
        match status {
            NotificationStatus::Pending => self.pending,
            NotificationStatus::Processing => self.processing,
            NotificationStatus::Sent => self.sent,
            NotificationStatus::Failed => self.failed,
            NotificationStatus::RetryExhausted => self.retry_exhausted,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.sent + self.failed + self.retry_exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_job_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&JobKind::ProcessPending).unwrap(),
            "\"process_pending\""
        );
        assert_eq!(
            serde_json::to_string(&JobKind::RetryFailed).unwrap(),
            "\"retry_failed\""
        );
        assert_eq!(JobKind::ProcessPending.to_string(), "process_pending");
    }

    #[test]
    fn test_trigger_ack_constructors() {
        let ack = TriggerAck::started(JobKind::ProcessPending);
        assert!(ack.accepted);
        assert!(!ack.coalesced);

        let ack = TriggerAck::coalesced(JobKind::RetryFailed);
        assert!(ack.accepted);
        assert!(ack.coalesced);
        assert_eq!(ack.job, JobKind::RetryFailed);
    }

    #[test]
    fn test_status_counts_accumulate() {
        let mut counts = StatusCounts::default();
        counts.add(NotificationStatus::Pending, 3);
        counts.add(NotificationStatus::Sent, 2);
        counts.add(NotificationStatus::RetryExhausted, 1);

        assert_eq!(counts.pending, 3);
        assert_eq!(counts.get(NotificationStatus::Sent), 2);
        assert_eq!(counts.total(), 6);
    }
}
