//! Configuration management module
//!
//! Handles loading, saving, and validation of the benchmark configuration.

use crate::parser::ParserCommand;
use crate::{DemoBenchError, Result, APP_NAME, CONFIG_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod persistence;

/// Maximum number of trials accepted by `validate`
pub const MAX_TRIALS: usize = 1000;

/// Benchmark configuration structure containing all run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Glob pattern selecting the demo files, e.g. `demos/*.dem`
    pub file_pattern: String,
    /// Number of timed passes over the file set
    pub trials: usize,
    /// Game event to extract from every demo
    pub event_name: String,
    /// Player properties projected onto each event
    pub player_fields: Vec<String>,
    /// Non-player properties projected onto each event
    pub other_fields: Vec<String>,
    /// Shuffle the file order before every trial
    pub shuffle: bool,
    /// Seed for the shuffle; a random seed is drawn when unset
    pub seed: Option<u64>,
    /// External parser invocation
    pub parser: ParserCommand,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            file_pattern: "./demos/*".to_string(),
            trials: 10,
            event_name: "player_death".to_string(),
            player_fields: vec!["X".to_string(), "Y".to_string()],
            other_fields: Vec::new(),
            shuffle: false,
            seed: None,
            parser: ParserCommand::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.file_pattern.trim().is_empty() {
            return Err(DemoBenchError::ConfigError(
                "File pattern must not be empty".to_string(),
            ));
        }

        glob::Pattern::new(&self.file_pattern).map_err(|e| {
            DemoBenchError::ConfigError(format!(
                "Invalid file pattern {:?}: {}",
                self.file_pattern, e
            ))
        })?;

        if self.trials == 0 {
            return Err(DemoBenchError::ConfigError(
                "Trial count must be greater than 0".to_string(),
            ));
        }

        if self.trials > MAX_TRIALS {
            return Err(DemoBenchError::ConfigError(format!(
                "Too many trials: {} (max: {})",
                self.trials, MAX_TRIALS
            )));
        }

        if self.event_name.trim().is_empty() {
            return Err(DemoBenchError::ConfigError(
                "Event name must not be empty".to_string(),
            ));
        }

        if let Some(field) = self
            .player_fields
            .iter()
            .chain(self.other_fields.iter())
            .find(|f| f.trim().is_empty() || f.contains(','))
        {
            return Err(DemoBenchError::ConfigError(format!(
                "Invalid field name {:?}: fields must be non-empty and must not contain ','",
                field
            )));
        }

        self.parser.validate()?;

        Ok(())
    }

    /// Set the file pattern
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Set the number of trials
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Set the event to extract
    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    /// Set the player field projection
    pub fn with_player_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.player_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the non-player field projection
    pub fn with_other_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.other_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Shuffle the file order per trial, optionally with a fixed seed
    pub fn with_shuffle(mut self, shuffle: bool, seed: Option<u64>) -> Self {
        self.shuffle = shuffle;
        self.seed = seed;
        self
    }

    /// Set the external parser invocation
    pub fn with_parser(mut self, parser: ParserCommand) -> Self {
        self.parser = parser;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DemoBenchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            DemoBenchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_file_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save configuration to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DemoBenchError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(path, self.to_toml()?).map_err(|e| {
            DemoBenchError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/demobench/demobench.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            DemoBenchError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.trials, 10);
        assert_eq!(config.event_name, "player_death");
        assert_eq!(config.player_fields, vec!["X", "Y"]);
        assert!(config.other_fields.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BenchmarkConfig::new().with_trials(0).validate().is_err());
        assert!(BenchmarkConfig::new()
            .with_trials(MAX_TRIALS + 1)
            .validate()
            .is_err());
        assert!(BenchmarkConfig::new().with_event_name(" ").validate().is_err());
        assert!(BenchmarkConfig::new().with_file_pattern("").validate().is_err());
        assert!(BenchmarkConfig::new()
            .with_file_pattern("demos/[")
            .validate()
            .is_err());
        assert!(BenchmarkConfig::new()
            .with_player_fields(["X", ""])
            .validate()
            .is_err());
        assert!(BenchmarkConfig::new()
            .with_other_fields(["a,b"])
            .validate()
            .is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = BenchmarkConfig::new()
            .with_trials(3)
            .with_other_fields(["round"])
            .with_shuffle(true, Some(7));
        let toml_str = config.to_toml().expect("Failed to serialize to TOML");
        let deserialized: BenchmarkConfig =
            toml::from_str(&toml_str).expect("Failed to deserialize from TOML");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BenchmarkConfig = toml::from_str("trials = 4\n").unwrap();
        assert_eq!(config.trials, 4);
        assert_eq!(config.event_name, "player_death");
        assert_eq!(config.parser, ParserCommand::default());
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = BenchmarkConfig::new()
            .with_file_pattern("/data/demos/*.dem")
            .with_event_name("round_end");

        config.save_to(&path).unwrap();
        let loaded = BenchmarkConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "trials = 0\n").unwrap();
        assert!(matches!(
            BenchmarkConfig::load_from(&path),
            Err(DemoBenchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_file_path() {
        if let Ok(path) = BenchmarkConfig::config_file_path() {
            assert!(path.to_string_lossy().contains("demobench.toml"));
        }
    }
}
