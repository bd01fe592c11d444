//! Routine records: one per running deletion job.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Threshold;
use crate::store::{ChannelId, ChannelInfo};

/// Unique routine identifier, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutineId(Uuid);

impl RoutineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for compact tables.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// Whether `prefix` (hex digits, hyphens ignored) starts this id.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix: String = prefix
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        !prefix.is_empty() && self.0.simple().to_string().starts_with(&prefix)
    }
}

impl Default for RoutineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RoutineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineMode {
    /// Re-runs every recurrence period until cancelled.
    Recurring,
    /// Runs a single cycle, then terminates.
    IntervalOnce,
}

impl RoutineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::IntervalOnce => "interval_once",
        }
    }
}

/// Phase of a routine, overwritten by its runner as it progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoutineStatus {
    Querying { found: usize },
    Deleting { remaining: usize, eta_secs: u64 },
    Waiting { next_run: DateTime<Utc> },
    Terminated,
}

impl fmt::Display for RoutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Querying { found } => write!(f, "querying ({found} found)"),
            Self::Deleting {
                remaining,
                eta_secs,
            } => write!(f, "deleting ({remaining} left, ~{eta_secs}s)"),
            Self::Waiting { next_run } => {
                write!(f, "waiting until {}", next_run.format("%m-%d %H:%M"))
            }
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

#[derive(Debug, Clone)]
struct RoutineProgress {
    status: RoutineStatus,
    deleted_count: u64,
    cycle_count: u64,
}

/// Parameters for registering a routine.
#[derive(Debug, Clone)]
pub struct NewRoutine {
    pub channel: ChannelInfo,
    /// Channel that receives progress and failure notices.
    pub report_to: ChannelId,
    pub threshold: Threshold,
}

/// A registered deletion routine.
///
/// Identity fields are immutable. Progress is written only by the routine's
/// runner and read by reports.
#[derive(Debug)]
pub struct Routine {
    pub id: RoutineId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub report_to: ChannelId,
    pub threshold: Threshold,
    pub created_at: DateTime<Utc>,
    progress: Mutex<RoutineProgress>,
    cancel: CancellationToken,
}

impl Routine {
    pub fn new(new: NewRoutine) -> Self {
        Self {
            id: RoutineId::new(),
            channel_id: new.channel.id,
            channel_name: new.channel.name,
            report_to: new.report_to,
            threshold: new.threshold,
            created_at: Utc::now(),
            progress: Mutex::new(RoutineProgress {
                status: RoutineStatus::Querying { found: 0 },
                deleted_count: 0,
                cycle_count: 0,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn mode(&self) -> RoutineMode {
        self.threshold.mode()
    }

    pub fn status(&self) -> RoutineStatus {
        self.progress.lock().status.clone()
    }

    pub fn deleted_count(&self) -> u64 {
        self.progress.lock().deleted_count
    }

    pub fn cycle_count(&self) -> u64 {
        self.progress.lock().cycle_count
    }

    pub fn snapshot(&self) -> RoutineSnapshot {
        let progress = self.progress.lock().clone();
        RoutineSnapshot {
            id: self.id,
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
            mode: self.mode(),
            threshold: self.threshold,
            window: self.threshold.describe(),
            status: progress.status,
            deleted_count: progress.deleted_count,
            cycle_count: progress.cycle_count,
            created_at: self.created_at,
        }
    }

    pub(crate) fn set_status(&self, status: RoutineStatus) {
        self.progress.lock().status = status;
    }

    pub(crate) fn record_deletion(&self) {
        self.progress.lock().deleted_count += 1;
    }

    pub(crate) fn record_cycle(&self) {
        self.progress.lock().cycle_count += 1;
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wake any sleep the runner is in. Does not interrupt store calls.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Point-in-time copy of a routine for listings and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutineSnapshot {
    pub id: RoutineId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub mode: RoutineMode,
    pub threshold: Threshold,
    pub window: String,
    pub status: RoutineStatus,
    pub deleted_count: u64,
    pub cycle_count: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChannelKind;

    fn new_routine(threshold: Threshold) -> Routine {
        Routine::new(NewRoutine {
            channel: ChannelInfo {
                id: ChannelId::new("1"),
                name: "general".into(),
                kind: ChannelKind::Text,
            },
            report_to: ChannelId::new("2"),
            threshold,
        })
    }

    #[test]
    fn test_new_routine_starts_clean() {
        let routine = new_routine(Threshold::max_age(30).unwrap());
        assert_eq!(routine.mode(), RoutineMode::Recurring);
        assert_eq!(routine.status(), RoutineStatus::Querying { found: 0 });
        assert_eq!(routine.deleted_count(), 0);
        assert_eq!(routine.cycle_count(), 0);
        assert!(!routine.cancel_token().is_cancelled());
    }

    #[test]
    fn test_counters_and_snapshot() {
        let routine = new_routine(Threshold::interval(1, 2));
        routine.record_deletion();
        routine.record_deletion();
        routine.record_cycle();
        routine.set_status(RoutineStatus::Terminated);

        let snapshot = routine.snapshot();
        assert_eq!(snapshot.mode, RoutineMode::IntervalOnce);
        assert_eq!(snapshot.deleted_count, 2);
        assert_eq!(snapshot.cycle_count, 1);
        assert_eq!(snapshot.status, RoutineStatus::Terminated);
        assert_eq!(snapshot.channel_name, "general");
    }

    #[test]
    fn test_ids_are_unique_and_parse() {
        let a = RoutineId::new();
        let b = RoutineId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<RoutineId>().unwrap(), a);
        assert_eq!(a.short().len(), 8);
        assert!("not-a-uuid".parse::<RoutineId>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            RoutineStatus::Deleting {
                remaining: 3,
                eta_secs: 3
            }
            .to_string(),
            "deleting (3 left, ~3s)"
        );
        assert_eq!(RoutineStatus::Terminated.to_string(), "terminated");

        let next_run = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            RoutineStatus::Waiting { next_run }.to_string(),
            "waiting until 03-04 05:06"
        );
    }
}
