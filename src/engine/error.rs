use crate::store::{ChannelId, StoreError};

/// Errors raised by the deletion engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "Invalid deletion window: the younger timestamp ({younger}) must be greater than the older timestamp ({older})"
    )]
    InvalidWindow { older: i64, younger: i64 },

    #[error("Invalid batch format: {0}")]
    InvalidFormat(String),

    #[error("Invalid batch entry #{index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("Could not resolve channel '{target}': {reason}")]
    ChannelResolution { target: String, reason: String },

    #[error("Failed to read message history of channel {channel}: {source}")]
    QueryFailure {
        channel: ChannelId,
        #[source]
        source: StoreError,
    },

    #[error("Max age must be a positive number of days")]
    InvalidMaxAge,

    #[error("The engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    /// Short label used for metrics, logs and API error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidWindow { .. } => "invalid_window",
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidEntry { .. } => "invalid_entry",
            Self::ChannelResolution { .. } => "channel_resolution",
            Self::QueryFailure { .. } => "query_failure",
            Self::InvalidMaxAge => "invalid_max_age",
            Self::ShuttingDown => "shutting_down",
        }
    }
}
