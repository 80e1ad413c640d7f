//! Utility functions module
//!
//! Contains helpers for formatting sizes and durations.

pub mod units;

// Re-export commonly used functions
pub use units::{format_bytes, format_duration, format_seconds};
