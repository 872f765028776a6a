//! Pipegraph Configuration Module
//!
//! Runtime limits and static-validation reactions.
//! Config is stored in `~/.config/pipegraph/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`PIPEGRAPH_RUN_MODE`, `PIPEGRAPH_MAX_BATCH_CONCURRENCY`)
//! 2. Config file (`~/.config/pipegraph/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result, StaticValidationKind};
use crate::runtime::RunMode;
use crate::util::{DEFAULT_DRY_RUN_LIST_SIZE, DEFAULT_MAX_PIPE_DEPTH};

pub const ENV_RUN_MODE: &str = "PIPEGRAPH_RUN_MODE";
pub const ENV_MAX_BATCH_CONCURRENCY: &str = "PIPEGRAPH_MAX_BATCH_CONCURRENCY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub run: RunSettings,

    /// Reaction per static-validation kind
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    pub default_run_mode: RunMode,

    /// Pipe-stack depth before a run is aborted
    pub max_pipe_depth: usize,

    /// Concurrent items per batch (unbounded when absent)
    pub max_batch_concurrency: Option<usize>,

    /// Items produced by dry runs for outputs of undetermined count
    pub dry_run_list_size: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_run_mode: RunMode::Live,
            max_pipe_depth: DEFAULT_MAX_PIPE_DEPTH,
            max_batch_concurrency: None,
            dry_run_list_size: DEFAULT_DRY_RUN_LIST_SIZE,
        }
    }
}

/// What to do when a static-validation check fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReaction {
    #[default]
    Raise,
    Log,
    Ignore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub inadequate_input_concept: ValidationReaction,
    pub missing_input_variable: ValidationReaction,
    pub extraneous_input_variable: ValidationReaction,
    pub ambiguous_input_candidate: ValidationReaction,
}

impl ValidationConfig {
    pub fn reaction(&self, kind: StaticValidationKind) -> ValidationReaction {
        match kind {
            StaticValidationKind::InadequateInputConcept => self.inadequate_input_concept,
            StaticValidationKind::MissingInputVariable => self.missing_input_variable,
            StaticValidationKind::ExtraneousInputVariable => self.extraneous_input_variable,
            StaticValidationKind::AmbiguousInputCandidate => self.ambiguous_input_candidate,
        }
    }
}

impl RuntimeConfig {
    /// Returns `~/.config/pipegraph/` on Unix, `%APPDATA%/pipegraph/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pipegraph")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()).and_then(Self::with_env)
    }

    /// Load from a file; defaults when the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| PipeError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipeError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Environment variables take precedence over file values.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(mode) = std::env::var(ENV_RUN_MODE) {
            if !mode.is_empty() {
                self.run.default_run_mode = mode.parse()?;
            }
        }

        if let Ok(limit) = std::env::var(ENV_MAX_BATCH_CONCURRENCY) {
            if !limit.is_empty() {
                let limit: usize = limit.parse().map_err(|_| PipeError::Config {
                    reason: format!(
                        "{ENV_MAX_BATCH_CONCURRENCY} must be a positive integer, got '{limit}'"
                    ),
                })?;
                self.run.max_batch_concurrency = (limit > 0).then_some(limit);
            }
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn config_path_contains_pipegraph() {
        let path = RuntimeConfig::config_path();
        assert!(path.to_string_lossy().contains("pipegraph"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.run.default_run_mode, RunMode::Live);
        assert_eq!(config.run.max_pipe_depth, DEFAULT_MAX_PIPE_DEPTH);
        assert_eq!(config.run.max_batch_concurrency, None);
        assert_eq!(
            config.validation.reaction(StaticValidationKind::MissingInputVariable),
            ValidationReaction::Raise
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = RuntimeConfig::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[run]\ndefault_run_mode = \"dry\"\nmax_batch_concurrency = 4\n\n[validation]\nextraneous_input_variable = \"log\"\n",
        )
        .unwrap();

        let config = RuntimeConfig::load_from(&path).unwrap();
        assert_eq!(config.run.default_run_mode, RunMode::Dry);
        assert_eq!(config.run.max_batch_concurrency, Some(4));
        assert_eq!(config.run.dry_run_list_size, DEFAULT_DRY_RUN_LIST_SIZE);
        assert_eq!(
            config.validation.reaction(StaticValidationKind::ExtraneousInputVariable),
            ValidationReaction::Log
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let err = RuntimeConfig::parse("[run\n").unwrap_err();
        assert!(matches!(err, PipeError::Config { .. }));
    }

    #[test]
    #[serial]
    fn env_overrides_config() {
        env::set_var(ENV_RUN_MODE, "dry");
        env::set_var(ENV_MAX_BATCH_CONCURRENCY, "2");

        let config = RuntimeConfig::default().with_env().unwrap();
        assert_eq!(config.run.default_run_mode, RunMode::Dry);
        assert_eq!(config.run.max_batch_concurrency, Some(2));

        env::remove_var(ENV_RUN_MODE);
        env::remove_var(ENV_MAX_BATCH_CONCURRENCY);
    }

    #[test]
    #[serial]
    fn invalid_env_value_is_an_error() {
        env::set_var(ENV_MAX_BATCH_CONCURRENCY, "many");
        let result = RuntimeConfig::default().with_env();
        env::remove_var(ENV_MAX_BATCH_CONCURRENCY);
        assert!(matches!(result.unwrap_err(), PipeError::Config { .. }));
    }
}
