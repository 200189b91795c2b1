//! Mutation run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::adapter::{DEFAULT_FRAMEWORK, PASSED_EXIT_CODE};
use super::report::QualityGate;

/// Directory, relative to the project, holding harness inputs and outputs by default.
pub const HARNESS_DIR: &str = ".mutation-harness";

/// Configuration for a mutation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationConfig {
    /// Project directory where test commands are executed.
    pub project_dir: PathBuf,
    /// Test framework adapter name.
    pub framework: String,
    /// Number of mutants tested concurrently.
    pub threads: usize,
    /// Optional per-mutant timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Optional substring filter for mutation selection.
    pub filter: Option<String>,
    /// Mutation manifest path; defaults to `<project>/.mutation-harness/mutations.json`.
    pub manifest: Option<PathBuf>,
    /// Extra arguments appended to the framework's test command.
    pub test_args: Vec<String>,
    /// Program and arguments for the `command` framework.
    pub command: Vec<String>,
    /// Exit codes meaning "tests failed", overriding the framework convention.
    pub failed_exit_codes: Option<Vec<i32>>,
    /// Optional JSONL file receiving every lifecycle event.
    pub events_log: Option<PathBuf>,
    /// Optional directory receiving per-mutant stdout/stderr logs.
    pub artifacts_dir: Option<PathBuf>,
    /// Completion status policy.
    pub quality_gate: QualityGate,
}

impl Default for MutationConfig {
    fn default() -> Self {
        let project_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            project_dir,
            framework: DEFAULT_FRAMEWORK.to_string(),
            threads: 1,
            timeout_secs: None,
            filter: None,
            manifest: None,
            test_args: Vec::new(),
            command: Vec::new(),
            failed_exit_codes: None,
            events_log: None,
            artifacts_dir: None,
            quality_gate: QualityGate::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid JSON for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Thread count must be positive.
    #[error("thread count must be at least 1")]
    InvalidThreads,
    /// Minimum MSI must be a percentage.
    #[error("minimum MSI must be within 0..=100, got {0}")]
    InvalidMinMsi(f64),
    /// Failing exit codes must not include the passing code.
    #[error("failed_exit_codes cannot contain the passing exit code {0}")]
    FailedCodeIsPassing(i32),
}

impl MutationConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }
        if let Some(min_msi) = self.quality_gate.min_msi {
            if !(0.0..=100.0).contains(&min_msi) {
                return Err(ConfigError::InvalidMinMsi(min_msi));
            }
        }
        if let Some(codes) = &self.failed_exit_codes {
            if codes.contains(&PASSED_EXIT_CODE) {
                return Err(ConfigError::FailedCodeIsPassing(PASSED_EXIT_CODE));
            }
        }
        Ok(())
    }

    /// Effective manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.project_dir.join(HARNESS_DIR).join("mutations.json"))
    }

    /// Per-mutant time limit.
    pub fn mutant_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Set project directory.
    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_dir = project_dir.into();
        self
    }

    /// Set framework adapter name.
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    /// Set thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Set selector filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set manifest path.
    pub fn with_manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    /// Set extra test command arguments.
    pub fn with_test_args(mut self, test_args: Vec<String>) -> Self {
        self.test_args = test_args;
        self
    }

    /// Set the program and arguments of the `command` framework.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Override the exit codes meaning "tests failed".
    pub fn with_failed_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.failed_exit_codes = Some(codes);
        self
    }

    /// Set events log path.
    pub fn with_events_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_log = Some(path.into());
        self
    }

    /// Set artifacts directory.
    pub fn with_artifacts_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(path.into());
        self
    }

    /// Set completion status policy.
    pub fn with_quality_gate(mut self, quality_gate: QualityGate) -> Self {
        self.quality_gate = quality_gate;
        self
    }
}
