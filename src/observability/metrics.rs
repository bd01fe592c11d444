//! Prometheus metrics for the deletion engine.
//!
//! Provides metrics for:
//! - Routines started and finished, by mode and outcome
//! - Messages deleted and delete failures by error kind
//! - History query failures
//! - Active routine count

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &[1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0],
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install_recorder()
        .map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a routine being registered.
pub fn record_routine_started(mode: &str) {
    #[cfg(feature = "prometheus")]
    counter!("routines_started_total", "mode" => mode.to_string()).increment(1);
    #[cfg(not(feature = "prometheus"))]
    let _ = mode;
}

/// Record a runner exiting.
///
/// # Arguments
/// * `mode` - `recurring` or `interval_once`
/// * `outcome` - `completed`, `cancelled` or `failed`
pub fn record_routine_finished(mode: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "routines_finished_total",
            "mode" => mode.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (mode, outcome);
    }
}

/// Record one completed query-and-delete cycle.
pub fn record_cycle(mode: &str, deleted: u64, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("deletion_cycles_total", "mode" => mode.to_string()).increment(1);
        histogram!("deletion_cycle_duration_seconds", "mode" => mode.to_string())
            .record(duration_secs);
        histogram!("deletion_cycle_messages", "mode" => mode.to_string()).record(deleted as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (mode, deleted, duration_secs);
    }
}

/// Record a successful message delete.
pub fn record_message_deleted() {
    #[cfg(feature = "prometheus")]
    counter!("messages_deleted_total").increment(1);
}

/// Record a failed message delete, labelled by store error kind.
pub fn record_delete_failure(kind: &str) {
    #[cfg(feature = "prometheus")]
    counter!("message_delete_failures_total", "kind" => kind.to_string()).increment(1);
    #[cfg(not(feature = "prometheus"))]
    let _ = kind;
}

/// Record a failed history query.
pub fn record_query_failure(kind: &str) {
    #[cfg(feature = "prometheus")]
    counter!("history_query_failures_total", "kind" => kind.to_string()).increment(1);
    #[cfg(not(feature = "prometheus"))]
    let _ = kind;
}

/// Set the number of registered routines.
pub fn set_active_routines(count: usize) {
    #[cfg(feature = "prometheus")]
    gauge!("active_routines").set(count as f64);
    #[cfg(not(feature = "prometheus"))]
    let _ = count;
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
