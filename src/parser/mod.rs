//! Parser interface module
//!
//! The benchmark never parses demos itself. It reaches the parsing
//! library through two operations: binding a parser to a file and
//! extracting one event type with a field projection.

use crate::Result;
use std::path::Path;

pub mod command;

// Re-export commonly used types
pub use command::{child_peak_rss, CommandParser, CommandParserFactory, ParserCommand, ParserMode};

/// Event extraction request shared by every parse in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Game event name, e.g. `player_death`
    pub event_name: String,
    /// Player properties to attach to each event
    pub player_fields: Vec<String>,
    /// Non-player properties to attach to each event
    pub other_fields: Vec<String>,
}

impl EventQuery {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            player_fields: Vec::new(),
            other_fields: Vec::new(),
        }
    }

    pub fn with_player_fields(mut self, fields: Vec<String>) -> Self {
        self.player_fields = fields;
        self
    }

    pub fn with_other_fields(mut self, fields: Vec<String>) -> Self {
        self.other_fields = fields;
        self
    }
}

/// A parser instance bound to a single demo file
pub trait DemoParser {
    /// Parsed events; opaque to the benchmark
    type Output;

    /// Extract every occurrence of `query.event_name`, projected to the
    /// requested fields
    fn parse_event(&mut self, query: &EventQuery) -> Result<Self::Output>;
}

/// Creates parsers bound to demo files
pub trait ParserFactory {
    type Parser: DemoParser;

    /// Called once before the first trial, outside the timed region
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Bind a new parser to `path`
    ///
    /// Fails when the file is missing or cannot be opened.
    fn construct(&self, path: &Path) -> Result<Self::Parser>;

    /// Called once after the last trial of a successful run
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

impl<F: ParserFactory + ?Sized> ParserFactory for &F {
    type Parser = F::Parser;

    fn prepare(&self) -> Result<()> {
        (**self).prepare()
    }

    fn construct(&self, path: &Path) -> Result<Self::Parser> {
        (**self).construct(path)
    }

    fn finish(&self) -> Result<()> {
        (**self).finish()
    }
}
