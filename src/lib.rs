//! Throttled, cancellable bulk-deletion routines for chat channels.
//!
//! A [`DeletionEngine`](engine::DeletionEngine) walks a channel's history
//! newest to oldest, deletes every message inside a time window one request
//! at a time, and reports progress back to the requester. Routines either
//! repeat on a fixed period (max-age policy) or run once over an explicit
//! timestamp window.

pub mod config;
pub mod engine;
pub mod observability;
pub mod routes;
pub mod store;

use tokio_util::sync::CancellationToken;

/// Shared state handed to every admin API handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: engine::DeletionEngine,
    /// Cancelled when the process should stop serving.
    pub shutdown: CancellationToken,
}
