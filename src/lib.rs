//! demobench - demo parsing benchmark harness
//!
//! Times an external demo parser over a set of replay files across
//! repeated trials and reports median/mean durations together with
//! traced heap usage.

use std::fmt;

// Public re-exports
pub mod bench;
pub mod config;
pub mod memory;
pub mod models;
pub mod parser;
pub mod report;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum DemoBenchError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Invalid glob pattern or unreadable match
    PatternError(String),
    /// The external parser failed to open or parse a demo
    ParserError(String),
    /// Memory tracker could not be acquired
    TrackerError(String),
    /// Results persistence error
    PersistenceError(String),
}

impl fmt::Display for DemoBenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoBenchError::IoError(err) => write!(f, "I/O error: {}", err),
            DemoBenchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            DemoBenchError::PatternError(msg) => write!(f, "File pattern error: {}", msg),
            DemoBenchError::ParserError(msg) => write!(f, "Parser error: {}", msg),
            DemoBenchError::TrackerError(msg) => write!(f, "Memory tracker error: {}", msg),
            DemoBenchError::PersistenceError(msg) => {
                write!(f, "Results persistence error: {}", msg)
            }
        }
    }
}

impl std::error::Error for DemoBenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DemoBenchError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DemoBenchError {
    fn from(err: std::io::Error) -> Self {
        DemoBenchError::IoError(err)
    }
}

impl From<glob::PatternError> for DemoBenchError {
    fn from(err: glob::PatternError) -> Self {
        DemoBenchError::PatternError(format!("invalid pattern: {}", err))
    }
}

impl From<glob::GlobError> for DemoBenchError {
    fn from(err: glob::GlobError) -> Self {
        DemoBenchError::PatternError(format!(
            "unreadable match {}: {}",
            err.path().display(),
            err.error()
        ))
    }
}

impl From<serde_json::Error> for DemoBenchError {
    fn from(err: serde_json::Error) -> Self {
        DemoBenchError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for DemoBenchError {
    fn from(err: toml::de::Error) -> Self {
        DemoBenchError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for DemoBenchError {
    fn from(err: toml::ser::Error) -> Self {
        DemoBenchError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for demobench operations
pub type Result<T> = std::result::Result<T, DemoBenchError>;

/// Error reporting helpers for the command line
pub mod error {
    use super::DemoBenchError;

    /// Convert error to user-friendly message with a hint where one exists
    pub fn user_friendly_message(error: &DemoBenchError) -> String {
        match error {
            DemoBenchError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            DemoBenchError::PatternError(msg) => {
                format!("{}. Quote the pattern so the shell does not expand it.", msg)
            }
            DemoBenchError::ParserError(msg) => {
                format!(
                    "{}. Check that the parser command is installed and the demo is intact.",
                    msg
                )
            }
            DemoBenchError::TrackerError(_) => {
                "Another benchmark is already tracing memory in this process.".to_string()
            }
            DemoBenchError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            _ => error.to_string(),
        }
    }

    /// Exit code used by the binary for a given error
    pub fn exit_code(error: &DemoBenchError) -> u8 {
        match error {
            DemoBenchError::ConfigError(_) | DemoBenchError::PatternError(_) => 2,
            _ => 1,
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "demobench";
pub const CONFIG_FILE: &str = "demobench.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const MAX_RESULTS_HISTORY: usize = 100;
