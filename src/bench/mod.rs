//! Benchmark engine module
//!
//! Contains file discovery and the sequential trial loop.

pub mod discovery;
pub mod runner;

// Re-export commonly used types
pub use discovery::FileSet;
pub use runner::{BenchmarkRunner, ProgressEvent, RunOutcome};
