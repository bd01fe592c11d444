//! Configuration module for purgekeeper.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! throttle_ms = 1000
//!
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! ```

mod engine;
mod observability;
mod server;
mod startup;
mod store;

use std::path::Path;

pub use engine::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use startup::*;
pub use store::*;

/// Configuration written by `purgekeeper init`.
pub const DEFAULT_CONFIG: &str = r#"# purgekeeper configuration

[engine]
throttle_ms = 1000
recurrence_hours = 6
page_size = 100
default_max_age_days = 30

[store]
type = "discord"
token = "${DISCORD_TOKEN}"

[server]
host = "127.0.0.1"
port = 8080

[startup]
# default_deletions = '[[30, "123456789012345678"]]'

[observability.logging]
level = "info"
format = "compact"
"#;

/// Root configuration.
///
/// All sections are optional. An empty file gives an in-memory store and
/// the default pacing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgekeeperConfig {
    /// Deletion engine pacing and paging.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Message store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Admin HTTP server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Routines launched at startup.
    #[serde(default)]
    pub startup: StartupConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PurgekeeperConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: PurgekeeperConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.store.validate()?;

        if let Some(batch) = &self.startup.default_deletions
            && let Err(e) = crate::engine::parse_batch(batch)
        {
            return Err(ConfigError::Validation(format!(
                "startup.default_deletions: {e}"
            )));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
