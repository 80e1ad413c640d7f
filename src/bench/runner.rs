//! Trial loop
//!
//! Runs the configured number of sequential trials. Each trial binds a
//! fresh parser to every file in the set, extracts the configured event
//! and records the wall-clock time of the whole pass. Parsed output is
//! dropped unread. Heap tracing brackets all trials.

use crate::bench::discovery::FileSet;
use crate::config::BenchmarkConfig;
use crate::memory::MemoryTracker;
use crate::models::{BenchmarkResult, MemorySnapshot, ResultSet, TrialResult};
use crate::parser::{DemoParser, EventQuery, ParserFactory};
use crate::{DemoBenchError, Result};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::hint::black_box;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Progress notification emitted while a run executes
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    /// A trial is about to start
    TrialStarted { trial: usize, trials: usize },
    /// One file was parsed within the current trial
    FileParsed {
        trial: usize,
        index: usize,
        path: &'a Path,
    },
    /// A trial finished
    TrialFinished(&'a TrialResult),
}

/// Timings and memory collected by a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub file_count: usize,
    pub trials: ResultSet,
    pub memory: MemorySnapshot,
}

impl RunOutcome {
    /// Attach the configuration and produce a persistable result
    pub fn into_result(
        self,
        config: BenchmarkConfig,
        child_peak_rss: Option<u64>,
    ) -> BenchmarkResult {
        BenchmarkResult::new(
            config,
            self.file_count,
            self.trials,
            self.memory,
            child_peak_rss,
        )
    }
}

/// Benchmark runner over a parser factory
pub struct BenchmarkRunner<F> {
    config: BenchmarkConfig,
    query: EventQuery,
    factory: F,
}

impl<F: ParserFactory> BenchmarkRunner<F> {
    /// Create a runner, validating the configuration first
    pub fn new(config: BenchmarkConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let query = EventQuery::new(config.event_name.clone())
            .with_player_fields(config.player_fields.clone())
            .with_other_fields(config.other_fields.clone());

        Ok(Self {
            config,
            query,
            factory,
        })
    }

    /// Run all trials without progress reporting
    pub fn run(&self, files: &FileSet) -> Result<RunOutcome> {
        self.run_with_progress(files, |_| {})
    }

    /// Run all trials, reporting progress through `on_progress`
    ///
    /// The factory is prepared before tracing starts and finished after the
    /// last trial. The first construct or parse failure aborts the run.
    pub fn run_with_progress<P>(&self, files: &FileSet, mut on_progress: P) -> Result<RunOutcome>
    where
        P: FnMut(ProgressEvent<'_>),
    {
        let trials = self.config.trials;
        let mut order: Vec<&Path> = files.iter().map(|p| p.as_path()).collect();
        let mut rng = self.shuffle_rng();

        info!(
            trials,
            files = order.len(),
            event = %self.query.event_name,
            "starting benchmark"
        );

        self.factory.prepare()?;
        let tracker = MemoryTracker::start();
        let mut results = ResultSet::with_capacity(trials);

        for trial in 1..=trials {
            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }

            on_progress(ProgressEvent::TrialStarted { trial, trials });
            let result = self.run_trial(trial, &order, &mut on_progress)?;
            debug!(trial, elapsed = ?result.elapsed, "trial finished");
            on_progress(ProgressEvent::TrialFinished(&result));
            results.push(result);
        }

        let memory = tracker.stop();
        self.factory.finish()?;

        Ok(RunOutcome {
            file_count: files.len(),
            trials: results,
            memory,
        })
    }

    /// Time one pass over `order`
    fn run_trial<P>(
        &self,
        trial: usize,
        order: &[&Path],
        on_progress: &mut P,
    ) -> Result<TrialResult>
    where
        P: FnMut(ProgressEvent<'_>),
    {
        let start = Instant::now();

        for (index, &path) in order.iter().enumerate() {
            let mut parser = self
                .factory
                .construct(path)
                .map_err(|e| in_trial(trial, e))?;
            let output = parser
                .parse_event(&self.query)
                .map_err(|e| in_trial(trial, e))?;
            drop(black_box(output));

            on_progress(ProgressEvent::FileParsed { trial, index, path });
        }

        Ok(TrialResult::new(trial, start.elapsed(), order.len()))
    }

    fn shuffle_rng(&self) -> Option<SmallRng> {
        if !self.config.shuffle {
            return None;
        }
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(seed, "shuffling file order per trial");
        Some(SmallRng::seed_from_u64(seed))
    }
}

fn in_trial(trial: usize, err: DemoBenchError) -> DemoBenchError {
    match err {
        DemoBenchError::ParserError(msg) => {
            DemoBenchError::ParserError(format!("trial {}: {}", trial, msg))
        }
        other => other,
    }
}
