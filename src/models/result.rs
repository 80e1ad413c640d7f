//! Benchmark result data models
//!
//! Contains structures for storing and serializing trial timings,
//! descriptive statistics and traced memory.

use crate::config::BenchmarkConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete benchmark result containing configuration, timings, and memory usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Timestamp when the benchmark finished
    pub timestamp: DateTime<Utc>,
    /// Configuration used for this benchmark
    pub config: BenchmarkConfig,
    /// Number of demo files in the file set
    pub file_count: usize,
    /// Per-trial timings, in execution order
    pub trials: ResultSet,
    /// Descriptive statistics over `trials`
    pub stats: TrialStats,
    /// Traced heap memory over the whole run
    pub memory: MemorySnapshot,
    /// Largest resident set size of any parser child process, in bytes
    #[serde(default)]
    pub child_peak_rss: Option<u64>,
}

/// Wall-clock time of one full pass over the file set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// One-based trial number
    pub trial: usize,
    /// Elapsed time for the pass
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Number of files parsed during the pass
    pub files_parsed: usize,
}

/// Ordered sequence of trial results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    trials: Vec<TrialResult>,
}

/// Descriptive statistics over trial durations, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; zero for fewer than two trials
    pub std_dev: f64,
}

/// Current and peak traced heap bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub current: u64,
    pub peak: u64,
}

impl BenchmarkResult {
    /// Assemble a result, deriving the statistics from `trials`
    pub fn new(
        config: BenchmarkConfig,
        file_count: usize,
        trials: ResultSet,
        memory: MemorySnapshot,
        child_peak_rss: Option<u64>,
    ) -> Self {
        let stats = trials.stats();
        Self {
            timestamp: Utc::now(),
            config,
            file_count,
            trials,
            stats,
            memory,
            child_peak_rss,
        }
    }

    /// Get a human-readable one-line summary of the benchmark result
    pub fn summary(&self) -> String {
        format!(
            "{} - {} x {} files - {} - median {:.3}s - mean {:.3}s - peak {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.trials.len(),
            self.file_count,
            self.config.event_name,
            self.stats.median,
            self.stats.mean,
            crate::util::units::format_bytes(self.memory.peak)
        )
    }

    /// Total time spent across all trials
    pub fn total_elapsed(&self) -> Duration {
        self.trials.iter().map(|t| t.elapsed).sum()
    }
}

impl TrialResult {
    pub fn new(trial: usize, elapsed: Duration, files_parsed: usize) -> Self {
        Self {
            trial,
            elapsed,
            files_parsed,
        }
    }

    /// Elapsed time in fractional seconds
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

impl ResultSet {
    pub fn with_capacity(trials: usize) -> Self {
        Self {
            trials: Vec::with_capacity(trials),
        }
    }

    pub fn push(&mut self, trial: TrialResult) {
        self.trials.push(trial);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrialResult> {
        self.trials.iter()
    }

    /// Trial durations in seconds, in execution order
    pub fn seconds(&self) -> Vec<f64> {
        self.trials.iter().map(TrialResult::seconds).collect()
    }

    pub fn stats(&self) -> TrialStats {
        TrialStats::from_seconds(&self.seconds())
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a TrialResult;
    type IntoIter = std::slice::Iter<'a, TrialResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}

impl FromIterator<TrialResult> for ResultSet {
    fn from_iter<I: IntoIterator<Item = TrialResult>>(iter: I) -> Self {
        Self {
            trials: iter.into_iter().collect(),
        }
    }
}

impl TrialStats {
    /// Compute statistics from samples in seconds
    ///
    /// The median of an even number of samples is the mean of the two
    /// middle values. An empty slice yields all zeros.
    pub fn from_seconds(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let variance =
                sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            median,
            mean,
            min: sorted[0],
            max: sorted[n - 1],
            std_dev,
        }
    }

    /// Compute statistics from durations
    pub fn from_durations(samples: &[Duration]) -> Self {
        let seconds: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
        Self::from_seconds(&seconds)
    }
}

impl MemorySnapshot {
    /// Build a snapshot, keeping `peak >= current`
    pub fn new(current: u64, peak: u64) -> Self {
        Self {
            current,
            peak: peak.max(current),
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}
