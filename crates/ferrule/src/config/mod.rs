use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_CLASS_NAME, FileExtension, Language, Placeholders, RunConfig,
    SourceNaming, Toolchain, public_class_name,
};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../ferrule.example.toml");

/// Default PATH handed to children when the environment is cleared
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Prefix for environment variable overrides (e.g. `FERRULE_LIMITS__WALL_TIME_LIMIT`)
pub const ENV_PREFIX: &str = "FERRULE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for ferrule
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-execution workspaces are created.
    ///
    /// Defaults to the system temporary directory.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Maximum number of executions holding a workspace at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Default resource limits applied to every stage.
    /// Unset fields fall back to [`ResourceLimits::default`].
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Confinement applied to every spawned stage
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Language configurations keyed by lowercase language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

/// Which sandbox policy wraps spawned processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// Children run directly on the host with only the wall clock deadline
    #[default]
    Unconfined,

    /// Children get kernel resource limits applied before exec
    Rlimits,
}

/// Sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub policy: SandboxKind,

    /// Start children with an empty environment plus `PATH`
    #[serde(default)]
    pub clear_env: bool,

    /// PATH used when `clear_env` is set
    #[serde(default = "default_sandbox_path")]
    pub path: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            policy: SandboxKind::default(),
            clear_env: false,
            path: default_sandbox_path(),
        }
    }
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            scratch_root: None,
            max_concurrent: default_max_concurrent(),
            limits: ResourceLimits::default(),
            sandbox: SandboxConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID, ignoring case
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(&id.to_lowercase())
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Sorted list of configured language IDs
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Directory workspaces are created in
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Merge built-in defaults, configured limits and stage overrides
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        let base = ResourceLimits::default().with_overrides(&self.limits);
        match overrides {
            Some(limits) => base.with_overrides(limits),
            None => base,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_max_concurrent() -> usize {
    8
}

fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}
