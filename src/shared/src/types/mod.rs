//! Shared type definitions for the Relay notification platform
//!
//! This module provides the type definitions shared between the dispatch
//! service and anything that embeds or calls it, keeping the record shape
//! and the job vocabulary consistent across the platform.

pub mod job;
pub mod notification;

// Re-export notification types
pub use notification::{
    CreateNotificationRequest, NotificationFilter, NotificationRecord, NotificationStatus,
    ParseStatusError,
};

// Re-export job control types
pub use job::{JobKind, StatusCounts, TriggerAck};
