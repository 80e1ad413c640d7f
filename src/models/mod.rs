//! Data models module
//!
//! Contains trial timings, descriptive statistics and memory snapshots.

pub mod result;

// Re-export commonly used types
pub use result::{BenchmarkResult, MemorySnapshot, ResultSet, TrialResult, TrialStats};
