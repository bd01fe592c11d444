//! Message store abstraction.
//!
//! The deletion engine never talks to a chat service directly. Everything it
//! needs (paginated reads, single-message deletes, channel lookup and
//! requester notices) goes through the [`MessageStore`] and [`Notifier`]
//! traits defined here.
//!
//! ## Available Stores
//!
//! - **DiscordStore**: Talks to the Discord REST API with a bot token
//! - **InMemoryStore**: Keeps channels and messages in process memory (local runs, tests)
//!
//! ## Configuration
//!
//! ```toml
//! [store]
//! type = "discord"
//! token = "${DISCORD_TOKEN}"
//! ```

mod discord;
mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
pub use discord::DiscordStore;
pub use memory::InMemoryStore;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;

/// Largest page a store will hand back for a single history query.
pub const MAX_PAGE_SIZE: usize = 100;

/// Identifier of a channel in the message store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a message. Stable, and ordered by creation within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parts of a stored message the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Creation time in epoch milliseconds.
    pub created_timestamp: i64,
}

/// Broad channel categories, as far as purging is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Announcement,
    Thread,
    Voice,
    Category,
    Forum,
    Other,
}

impl ChannelKind {
    /// Whether the channel has a message history that can be paged and purged.
    pub fn is_text_capable(&self) -> bool {
        matches!(self, Self::Text | Self::Announcement | Self::Thread)
    }
}

/// A resolved entry from the store's channel directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

/// Errors from message stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Missing permission: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid channel target '{0}'")]
    InvalidTarget(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// True for failures caused by missing permissions rather than transport problems.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::InvalidTarget(_) => "invalid_target",
            Self::Http(_) => "http",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
            Self::Other(_) => "other",
        }
    }
}

/// Paginated read and single-message delete access to channel histories.
///
/// Implementations must be thread-safe; many routines share one store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The most recent message in the channel, if any.
    async fn fetch_latest(&self, channel: &ChannelId) -> Result<Option<Message>, StoreError>;

    /// Up to `limit` messages strictly older than `before`, newest first.
    ///
    /// An empty page means the history is exhausted.
    async fn fetch_page(
        &self,
        channel: &ChannelId,
        before: &MessageId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Delete a single message.
    async fn delete_message(&self, channel: &ChannelId, message: &MessageId)
    -> Result<(), StoreError>;

    /// Look up a channel by the textual target a requester supplied.
    async fn resolve_channel(&self, target: &str) -> Result<ChannelInfo, StoreError>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}

/// Sends plain-text notices to a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &ChannelId, text: &str) -> Result<(), StoreError>;
}

/// The store and notifier backing one engine instance.
#[derive(Clone)]
pub struct StoreHandles {
    pub store: Arc<dyn MessageStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Create the configured message store.
pub fn create_store(config: &StoreConfig) -> Result<StoreHandles, StoreError> {
    match config {
        StoreConfig::Discord(discord) => {
            let store = Arc::new(DiscordStore::from_config(discord)?);
            Ok(StoreHandles {
                store: store.clone(),
                notifier: store,
            })
        }
        StoreConfig::Memory(memory) => {
            let store = Arc::new(InMemoryStore::from_config(memory));
            Ok(StoreHandles {
                store: store.clone(),
                notifier: store,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_capable_kinds() {
        assert!(ChannelKind::Text.is_text_capable());
        assert!(ChannelKind::Announcement.is_text_capable());
        assert!(ChannelKind::Thread.is_text_capable());
        assert!(!ChannelKind::Voice.is_text_capable());
        assert!(!ChannelKind::Category.is_text_capable());
        assert!(!ChannelKind::Forum.is_text_capable());
    }

    #[test]
    fn test_authorization_classification() {
        assert!(StoreError::Authorization("Missing Permissions".into()).is_authorization());
        assert!(!StoreError::NotFound("message".into()).is_authorization());
        assert_eq!(StoreError::Other("boom".into()).kind(), "other");
    }

    #[test]
    fn test_create_memory_store() {
        let handles = create_store(&StoreConfig::default()).unwrap();
        assert_eq!(handles.store.name(), "memory");
    }
}
