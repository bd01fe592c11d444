//! Batch launcher: start one recurring routine per `[max_age_days, channel]` pair.
//!
//! ```json
//! [[30, "123456789012345678"], [7, "<#876543210987654321>"]]
//! ```
//!
//! Input that is not a JSON array fails as a whole and starts nothing.
//! Inside the array every entry stands alone: malformed pairs and channels
//! that cannot be resolved are logged and skipped.

use serde::Serialize;
use serde_json::Value;

use super::{DeletionEngine, EngineError, RoutineSnapshot};
use crate::{config::StartupConfig, store::ChannelId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub max_age_days: u32,
    pub target: String,
}

/// Outcome of launching a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub started: Vec<RoutineSnapshot>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub index: usize,
    pub target: Option<String>,
    pub reason: String,
}

/// Parse batch input into per-entry results.
///
/// The outer error is reserved for input that is not a JSON array.
pub fn parse_batch(input: &str) -> Result<Vec<Result<BatchEntry, EngineError>>, EngineError> {
    let value: Value =
        serde_json::from_str(input).map_err(|e| EngineError::InvalidFormat(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(EngineError::InvalidFormat(
            "expected a JSON array of [max_age_days, channel] pairs".into(),
        ));
    };

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_entry(index, item))
        .collect())
}

fn parse_entry(index: usize, item: Value) -> Result<BatchEntry, EngineError> {
    let invalid = |reason: String| EngineError::InvalidEntry { index, reason };

    let (days, target): (i64, Value) = serde_json::from_value(item)
        .map_err(|e| invalid(format!("expected [max_age_days, channel]: {e}")))?;

    let max_age_days = u32::try_from(days)
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| invalid(format!("max age must be a positive number of days, got {days}")))?;

    let target = match target {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => return Err(invalid(format!("channel must be a string, got {other}"))),
    };

    Ok(BatchEntry {
        max_age_days,
        target,
    })
}

impl DeletionEngine {
    /// Start a recurring routine for every usable entry of `input`.
    pub async fn launch_batch(
        &self,
        input: &str,
        report_to: Option<ChannelId>,
    ) -> Result<BatchReport, EngineError> {
        let entries = parse_batch(input)?;
        let mut report = BatchReport::default();

        for (index, entry) in entries.into_iter().enumerate() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed batch entry");
                    report.skipped.push(SkippedEntry {
                        index,
                        target: None,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self
                .start_recurring(&entry.target, Some(entry.max_age_days), report_to.clone())
                .await
            {
                Ok(snapshot) => report.started.push(snapshot),
                Err(e) => {
                    tracing::warn!(
                        index,
                        target = %entry.target,
                        error = %e,
                        "Skipping batch entry"
                    );
                    report.skipped.push(SkippedEntry {
                        index,
                        target: Some(entry.target),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            started = report.started.len(),
            skipped = report.skipped.len(),
            "Batch launched"
        );
        Ok(report)
    }

    /// Launch the configured startup batch, if any.
    pub async fn launch_startup(&self, startup: &StartupConfig) -> Result<BatchReport, EngineError> {
        let Some(batch) = &startup.default_deletions else {
            return Ok(BatchReport::default());
        };
        let report_to = startup.report_channel.as_deref().map(ChannelId::from);
        self.launch_batch(batch, report_to).await
    }
}
