//! Shared types for the Relay notification platform

pub mod types;

// Export all types from types module
pub use types::*;
