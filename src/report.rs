//! Console report
//!
//! Writes per-trial timings, the median/mean summary and traced memory
//! usage. Summary lines are magenta when color is enabled.

use crate::models::{BenchmarkResult, MemorySnapshot, TrialResult, TrialStats};
use crate::util::units::{format_bytes, format_duration, format_seconds};
use crate::Result;
use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;

/// Line-oriented report writer
pub struct Reporter<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    /// Describe the run before the first trial
    pub fn header(&mut self, file_count: usize, trials: usize, event_name: &str) -> Result<()> {
        writeln!(
            self.out,
            "Parsing {} files x {} trials, event {:?}",
            file_count, trials, event_name
        )?;
        Ok(())
    }

    pub fn trial(&mut self, result: &TrialResult, trials: usize) -> Result<()> {
        writeln!(
            self.out,
            "Trial {}/{}: {}",
            result.trial,
            trials,
            format_seconds(result.elapsed)
        )?;
        Ok(())
    }

    pub fn stats(&mut self, stats: &TrialStats) -> Result<()> {
        self.highlight(&format!(
            "-- Median: {:.6}s, mean: {:.6}s",
            stats.median, stats.mean
        ))?;
        self.highlight(&format!(
            "-- Min: {:.6}s, max: {:.6}s, std dev: {:.6}s",
            stats.min, stats.max, stats.std_dev
        ))
    }

    pub fn memory(&mut self, memory: &MemorySnapshot, child_peak_rss: Option<u64>) -> Result<()> {
        self.highlight(&format!(
            "-- Memory usage: {}; {}",
            format_bytes(memory.current),
            format_bytes(memory.peak)
        ))?;
        if let Some(rss) = child_peak_rss {
            self.highlight(&format!("-- Parser process peak RSS: {}", format_bytes(rss)))?;
        }
        Ok(())
    }

    /// Summary, memory and total time lines for a finished run
    pub fn summary(&mut self, result: &BenchmarkResult) -> Result<()> {
        self.stats(&result.stats)?;
        self.memory(&result.memory, result.child_peak_rss)?;
        writeln!(
            self.out,
            "Total time: {}",
            format_duration(result.total_elapsed())
        )?;
        Ok(())
    }

    /// Full result as pretty JSON
    pub fn json(&mut self, result: &BenchmarkResult) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, result)?;
        writeln!(self.out)?;
        Ok(())
    }

    /// One line per saved result, oldest first
    pub fn history(&mut self, results: &[BenchmarkResult]) -> Result<()> {
        for result in results {
            writeln!(self.out, "{}", result.summary())?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn highlight(&mut self, line: &str) -> Result<()> {
        if self.color {
            writeln!(self.out, "{}", line.magenta())?;
        } else {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }
}

/// Progress bar over every parse of the run, drawn on stderr
pub fn progress_bar(total_parses: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_parses);
    let style =
        ProgressStyle::with_template("{spinner} {pos}/{len} parses [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
