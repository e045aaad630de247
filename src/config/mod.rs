//! Exploration configuration, loaded from a JSON file.
//!
//! ```json
//! {
//!   "project": { "name": "gemm", "output-num": 4 },
//!   "design-space": { "definition": { "tile": [8, 16, 32] }, "max-part-num": 4 },
//!   "search": { "algorithm": "exhaustive" },
//!   "timeout": { "exploration": 240, "evaluation": 20 },
//!   "evaluate": { "command": "make estimate", "worker-per-part": 2 },
//!   "database": { "backend": "redis", "url": "redis://127.0.0.1:6379/" }
//! }
//! ```
//!
//! Every section except `project`, `design-space` and `evaluate` may be
//! omitted. The configuration is validated before any component is built.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::store::QualityPolicy;

/// Search algorithms a worker can run.
pub const SEARCH_ALGORITHMS: &[&str] = &["exhaustive"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub project: ProjectConfig,
    pub design_space: DesignSpaceConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    pub evaluate: EvaluateConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub name: String,
    /// Number of best results kept and materialized.
    #[serde(default = "default_output_num")]
    pub output_num: usize,
    #[serde(default)]
    pub quality: QualityPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DesignSpaceConfig {
    /// Opaque definition handed to the design-space compiler.
    pub definition: serde_json::Value,
    #[serde(default = "default_max_part_num")]
    pub max_part_num: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Supervisor status/trim tick.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            algorithm: default_algorithm(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Timeouts in minutes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeoutConfig {
    #[serde(default = "default_exploration_timeout")]
    pub exploration: f64,
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            exploration: default_exploration_timeout(),
            evaluation: default_evaluation_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn exploration(&self) -> Duration {
        Duration::from_secs_f64(self.exploration * 60.0)
    }

    pub fn evaluation(&self) -> Duration {
        Duration::from_secs_f64(self.evaluation * 60.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvaluateConfig {
    /// Shell command run inside each job directory.
    pub command: String,
    #[serde(default = "default_worker_per_part")]
    pub worker_per_part: usize,
    /// Shell command that generates the intermediate artifact before evaluation.
    #[serde(default)]
    pub transform: Option<String>,
    /// Generated file, relative to the job directory, whose content hash dedups points.
    #[serde(default)]
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Redis,
    #[default]
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: BackendKind::default(),
            url: default_redis_url(),
            path: default_db_path(),
        }
    }
}

fn default_output_num() -> usize {
    1
}

fn default_max_part_num() -> usize {
    4
}

fn default_algorithm() -> String {
    "exhaustive".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_exploration_timeout() -> f64 {
    60.0
}

fn default_evaluation_timeout() -> f64 {
    10.0
}

fn default_worker_per_part() -> usize {
    1
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("result.db")
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.project.name.trim().is_empty() {
            return invalid("project.name must not be empty");
        }
        if self.project.name.contains(char::is_whitespace) {
            return invalid("project.name must not contain whitespace");
        }
        if self.project.output_num == 0 {
            return invalid("project.output-num must be at least 1");
        }
        if !self.design_space.definition.is_object() {
            return invalid("design-space.definition must be an object");
        }
        if self.design_space.max_part_num == 0 {
            return invalid("design-space.max-part-num must be at least 1");
        }
        if !SEARCH_ALGORITHMS.contains(&self.search.algorithm.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown search.algorithm {:?}, expected one of {:?}",
                self.search.algorithm, SEARCH_ALGORITHMS
            )));
        }
        if self.search.poll_interval_ms == 0 {
            return invalid("search.poll-interval-ms must be positive");
        }
        if !(self.timeout.exploration > 0.0 && self.timeout.exploration.is_finite()) {
            return invalid("timeout.exploration must be a positive number of minutes");
        }
        if !(self.timeout.evaluation > 0.0 && self.timeout.evaluation.is_finite()) {
            return invalid("timeout.evaluation must be a positive number of minutes");
        }
        if self.evaluate.command.trim().is_empty() {
            return invalid("evaluate.command must not be empty");
        }
        if self.evaluate.worker_per_part == 0 {
            return invalid("evaluate.worker-per-part must be at least 1");
        }
        if self.database.backend == BackendKind::Redis && self.database.url.is_empty() {
            return invalid("database.url is required for the redis backend");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.search.poll_interval_ms)
    }
}
