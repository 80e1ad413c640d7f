//! Results persistence module
//!
//! Handles saving, loading, and rotation of benchmark results.

use crate::models::BenchmarkResult;
use crate::{DemoBenchError, Result, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<BenchmarkResult>,
}

impl ResultsStorage {
    /// Create a results storage manager at the standard location
    pub fn new() -> Result<Self> {
        let results_path = Self::results_file_path()?;
        Ok(Self { results_path })
    }

    /// Create a results storage manager backed by an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: path.into(),
        }
    }

    /// Get the standard results file path
    /// Uses $DATA_HOME/demobench/results.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            DemoBenchError::PersistenceError("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all results from the results file
    pub fn load_results(&self) -> Result<Vec<BenchmarkResult>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            DemoBenchError::PersistenceError(format!(
                "Failed to read results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            DemoBenchError::PersistenceError(format!(
                "Failed to parse results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.results)
    }

    /// Append a new result to the results file
    /// Keeps at most MAX_RESULTS_HISTORY entries, dropping the oldest
    pub fn append_result(&self, result: BenchmarkResult) -> Result<()> {
        let mut results = self.load_results()?;
        results.push(result);

        if results.len() > MAX_RESULTS_HISTORY {
            let skip_count = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..skip_count);
        }

        self.save_results(results)
    }

    fn save_results(&self, results: Vec<BenchmarkResult>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DemoBenchError::PersistenceError(format!(
                    "Failed to create results directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let results_file = ResultsFile {
            version: 1,
            results,
        };

        let content = serde_json::to_string_pretty(&results_file)?;

        fs::write(&self.results_path, content).map_err(|e| {
            DemoBenchError::PersistenceError(format!(
                "Failed to write results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the most recent N results, oldest first
    pub fn get_recent_results(&self, count: usize) -> Result<Vec<BenchmarkResult>> {
        let mut results = self.load_results()?;
        let skip_count = results.len().saturating_sub(count);
        results.drain(..skip_count);
        Ok(results)
    }

    /// Path of the backing results file
    pub fn results_path(&self) -> &Path {
        &self.results_path
    }
}
