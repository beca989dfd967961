//! Configuration file loading for ferrule
//!
//! Handles loading and parsing configuration files using the config crate.

use std::collections::HashMap;
use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG};
use crate::types::{MAX_WALL_TIME_LIMIT, is_valid_wall_time};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_config_file(path.as_ref())?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Load a file (or the embedded defaults) and layer `FERRULE_*` environment overrides
    ///
    /// Nested keys use a double underscore: `FERRULE_LIMITS__WALL_TIME_LIMIT=3`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, env_overrides())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let content = match path {
            Some(path) => read_config_file(path)?,
            None => EXAMPLE_CONFIG.to_owned(),
        };

        let config = ConfigBuilder::builder()
            .add_source(File::from_str(&content, FileFormat::Toml))
            .add_source(env)
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    fn finish(mut config: Config) -> Result<Self, ConfigError> {
        config.normalize_language_ids()?;
        config.validate()?;
        Ok(config)
    }

    /// Store language IDs lowercase so lookups can ignore case
    fn normalize_language_ids(&mut self) -> Result<(), ConfigError> {
        let mut normalized = HashMap::with_capacity(self.languages.len());
        for (id, language) in self.languages.drain() {
            let key = id.to_lowercase();
            if normalized.insert(key.clone(), language).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "language '{key}' is defined more than once"
                )));
            }
        }
        self.languages = normalized;
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        validate_wall_time("limits", self.limits.wall_time_limit)?;

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref limits) = lang.run.limits {
                validate_wall_time(&format!("language '{id}' run limits"), limits.wall_time_limit)?;
            }
            if let Some(ref compile) = lang.compile {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has empty compile command"
                    )));
                }
                if let Some(ref limits) = compile.limits {
                    validate_wall_time(
                        &format!("language '{id}' compile limits"),
                        limits.wall_time_limit,
                    )?;
                }
            }
        }

        Ok(())
    }
}

/// `FERRULE_` prefix, `__` between nested keys
fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_wall_time(scope: &str, seconds: Option<f64>) -> Result<(), ConfigError> {
    match seconds {
        Some(value) if !is_valid_wall_time(value) => Err(ConfigError::Invalid(format!(
            "{scope}: wall_time_limit must be between 0 and {MAX_WALL_TIME_LIMIT} seconds, got {value}"
        ))),
        _ => Ok(()),
    }
}
