//! Observability: structured logging and Prometheus metrics.
//!
//! - Logging goes through `tracing`, with the subscriber configured from
//!   `[observability.logging]` (pretty, compact or JSON output)
//! - Engine metrics are recorded through [`metrics`] helpers and exported
//!   on `/metrics` when the `prometheus` feature is enabled

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
