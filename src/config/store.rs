//! Message store configuration.
//!
//! # Example
//!
//! ```toml
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! timeout_secs = 30
//! ```
//!
//! ```toml
//! [store]
//! type = "memory"
//!
//! [[store.channels]]
//! id = "general"
//! name = "general"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::store::ChannelKind;

/// Which message store backs the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Discord REST API.
    Discord(DiscordStoreConfig),
    /// Process memory. Nothing survives a restart.
    Memory(MemoryStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig::default())
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Discord(discord) => discord.validate(),
            Self::Memory(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordStoreConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bot token, sent as `Authorization: Bot <token>`.
    pub token: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DiscordStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.token is required for the discord store".into(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "store.base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryStoreConfig {
    /// Channels that exist at startup.
    #[serde(default)]
    pub channels: Vec<MemoryChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryChannelConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_channel_kind")]
    pub kind: ChannelKind,
}

fn default_channel_kind() -> ChannelKind {
    ChannelKind::Text
}
