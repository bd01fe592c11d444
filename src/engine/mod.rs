//! Deletion routine engine.
//!
//! Creates, tracks, paces and cancels concurrent deletion routines. Each
//! routine purges one channel, either repeatedly (everything older than N
//! days, re-checked every recurrence period) or once (everything between two
//! timestamps).
//!
//! ## Components
//!
//! - [`RoutineRegistry`]: the set of live routines; removal is cancellation
//! - [`RoutineRunner`]: the per-routine state machine
//! - [`Threshold`]: resolves the matching window for a cycle
//! - [`Throttle`]: fixed delay before every store call
//! - [`DeletionEngine`]: entry point tying these to a message store
//!
//! Runners and notices run on a [`TaskTracker`] so shutdown can wait for them.

mod error;
mod launcher;
mod notices;
mod registry;
mod report;
mod routine;
mod runner;
mod threshold;
mod throttle;

use std::{sync::Arc, time::Duration};

pub use error::EngineError;
pub use launcher::{BatchEntry, BatchReport, SkippedEntry, parse_batch};
pub use notices::Notices;
pub use registry::RoutineRegistry;
pub use report::render_page;
pub use routine::{NewRoutine, Routine, RoutineId, RoutineMode, RoutineSnapshot, RoutineStatus};
pub use runner::{RoutineOutcome, RoutineRunner, RunnerSettings};
use serde::Serialize;
pub use threshold::{MS_PER_DAY, Threshold, Window, now_ms};
pub use throttle::Throttle;
use tokio_util::task::TaskTracker;

use crate::{
    config::EngineConfig,
    observability::metrics,
    store::{ChannelId, ChannelInfo, MessageStore, StoreHandles},
};

/// Result of halting every routine in a channel.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub halted: usize,
}

struct EngineInner {
    config: EngineConfig,
    registry: RoutineRegistry,
    store: Arc<dyn MessageStore>,
    runner: Arc<RoutineRunner>,
    notices: Notices,
    tracker: TaskTracker,
}

/// Handle to the deletion engine. Cheap to clone.
#[derive(Clone)]
pub struct DeletionEngine {
    inner: Arc<EngineInner>,
}

impl DeletionEngine {
    pub fn new(config: EngineConfig, handles: StoreHandles, registry: RoutineRegistry) -> Self {
        let tracker = TaskTracker::new();
        let notices = Notices::new(handles.notifier, tracker.clone());
        let runner = Arc::new(RoutineRunner::new(
            registry.clone(),
            handles.store.clone(),
            notices.clone(),
            Throttle::new(config.throttle()),
            RunnerSettings::from(&config),
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                store: handles.store,
                runner,
                notices,
                tracker,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &RoutineRegistry {
        &self.inner.registry
    }

    pub fn store_name(&self) -> &'static str {
        self.inner.store.name()
    }

    /// Start a recurring routine purging messages older than `max_age_days`
    /// (the configured default when `None`).
    ///
    /// Notices go to `report_to`, or to the purged channel itself.
    pub async fn start_recurring(
        &self,
        target: &str,
        max_age_days: Option<u32>,
        report_to: Option<ChannelId>,
    ) -> Result<RoutineSnapshot, EngineError> {
        let days = max_age_days.unwrap_or(self.inner.config.default_max_age_days);
        let threshold = Threshold::max_age(days)?;
        let channel = self.resolve_text_channel(target).await?;
        self.spawn(channel, threshold, report_to)
    }

    /// Start a one-shot routine purging messages created strictly between
    /// `older_ms` and `younger_ms`.
    ///
    /// Bounds are not checked here; a malformed window makes the routine
    /// abort before its first query and notify the requester.
    pub async fn start_interval(
        &self,
        target: &str,
        older_ms: i64,
        younger_ms: i64,
        report_to: Option<ChannelId>,
    ) -> Result<RoutineSnapshot, EngineError> {
        let channel = self.resolve_text_channel(target).await?;
        self.spawn(channel, Threshold::interval(older_ms, younger_ms), report_to)
    }

    async fn resolve_text_channel(&self, target: &str) -> Result<ChannelInfo, EngineError> {
        let resolution = |reason: String| EngineError::ChannelResolution {
            target: target.to_string(),
            reason,
        };

        let channel = self
            .inner
            .store
            .resolve_channel(target)
            .await
            .map_err(|e| resolution(e.to_string()))?;

        if !channel.kind.is_text_capable() {
            return Err(resolution(format!("{} is not a text channel", channel.name)));
        }
        Ok(channel)
    }

    fn spawn(
        &self,
        channel: ChannelInfo,
        threshold: Threshold,
        report_to: Option<ChannelId>,
    ) -> Result<RoutineSnapshot, EngineError> {
        if self.inner.tracker.is_closed() {
            return Err(EngineError::ShuttingDown);
        }

        let mode = threshold.mode();
        let acknowledgement = match mode {
            RoutineMode::Recurring => format!(
                "Delete process activated for {}. Will begin deletion every {}.",
                channel.name,
                self.inner.config.recurrence_label()
            ),
            RoutineMode::IntervalOnce => format!(
                "Delete process activated for {}. Will run once.",
                channel.name
            ),
        };
        let report_to = report_to.unwrap_or_else(|| channel.id.clone());

        let routine = self.inner.registry.add(NewRoutine {
            channel,
            report_to,
            threshold,
        });
        metrics::record_routine_started(mode.as_str());
        self.inner.notices.send(&routine.report_to, acknowledgement);

        let runner = self.inner.runner.clone();
        let task_routine = routine.clone();
        self.inner.tracker.spawn(async move {
            runner.run(task_routine).await;
        });

        Ok(routine.snapshot())
    }

    /// Halt every routine purging the channel named by `target`.
    ///
    /// Unresolvable targets are matched as raw channel ids.
    pub async fn stop_channel(&self, target: &str) -> StopReport {
        let (channel_id, channel_name) = match self.inner.store.resolve_channel(target).await {
            Ok(info) => (info.id, info.name),
            Err(e) => {
                tracing::debug!(target, error = %e, "Stopping by raw channel id");
                let id = target.trim();
                (ChannelId::new(id), id.to_string())
            }
        };

        let halted = self.inner.registry.remove_by_channel(&channel_id);
        tracing::info!(channel_id = %channel_id, halted, "Halted deletion routines");

        StopReport {
            channel_id,
            channel_name,
            halted,
        }
    }

    /// Halt one routine. Returns whether it was still registered.
    pub fn cancel(&self, id: &RoutineId) -> bool {
        let removed = self.inner.registry.remove_by_id(id);
        if removed {
            tracing::info!(routine_id = %id, "Cancelled deletion routine");
        }
        removed
    }

    pub fn list(&self) -> Vec<RoutineSnapshot> {
        self.inner.registry.list()
    }

    /// Render one page of the status table.
    pub fn status_page(&self, page: usize) -> String {
        render_page(&self.list(), page, self.inner.config.report_page_size)
    }

    /// Cancel every routine and wait for runners and pending notices.
    ///
    /// Returns how many routines were halted. New routines are refused
    /// afterwards.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let halted = self.inner.registry.clear();
        self.inner.tracker.close();

        tracing::info!(
            halted,
            pending_tasks = self.inner.tracker.len(),
            "Shutting down deletion engine"
        );

        if tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending_tasks = self.inner.tracker.len(),
                "Timed out waiting for deletion routines to stop"
            );
        }
        halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChannelKind, InMemoryStore};

    fn engine() -> (DeletionEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.add_channel("10", "general", ChannelKind::Text);
        store.add_channel("20", "lobby", ChannelKind::Voice);
        let handles = StoreHandles {
            store: store.clone(),
            notifier: store.clone(),
        };
        let config = EngineConfig {
            throttle_ms: 10,
            ..Default::default()
        };
        (
            DeletionEngine::new(config, handles, RoutineRegistry::new()),
            store,
        )
    }

    async fn wait_until_idle(engine: &DeletionEngine) {
        while !engine.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_recurring_uses_default_age() {
        let (engine, store) = engine();

        let snapshot = engine.start_recurring("10", None, None).await.unwrap();

        assert_eq!(snapshot.mode, RoutineMode::Recurring);
        assert_eq!(snapshot.threshold, Threshold::MaxAge { days: 30 });
        assert!(engine.registry().is_active(&snapshot.id));

        engine.shutdown(Duration::from_secs(1)).await;
        assert!(store.notices().contains(&(
            ChannelId::new("10"),
            "Delete process activated for general. Will begin deletion every 6 hours.".into()
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_bad_targets() {
        let (engine, _) = engine();

        assert!(matches!(
            engine.start_recurring("20", Some(5), None).await,
            Err(EngineError::ChannelResolution { .. })
        ));
        assert!(matches!(
            engine.start_recurring("nope", Some(5), None).await,
            Err(EngineError::ChannelResolution { .. })
        ));
        assert!(matches!(
            engine.start_recurring("10", Some(0), None).await,
            Err(EngineError::InvalidMaxAge)
        ));
        assert!(engine.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_routine_runs_to_completion() {
        let (engine, store) = engine();
        let channel = ChannelId::new("10");
        for ts in [100, 200, 300] {
            store.insert_message(&channel, ts);
        }

        engine
            .start_interval("10", 150, 1000, Some(ChannelId::new("ops")))
            .await
            .unwrap();
        wait_until_idle(&engine).await;
        engine.shutdown(Duration::from_secs(60)).await;

        assert_eq!(store.messages(&channel).len(), 1);
        let ops: Vec<String> = store
            .notices()
            .into_iter()
            .filter(|(c, _)| c.as_str() == "ops")
            .map(|(_, text)| text)
            .collect();
        assert!(ops.contains(
            &"Deletion process finished. Successfully deleted 2 in general. Will NOT repeat."
                .to_string()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_interval_is_reported_not_rejected() {
        let (engine, store) = engine();

        let snapshot = engine.start_interval("10", 100, 100, None).await.unwrap();
        wait_until_idle(&engine).await;
        engine.shutdown(Duration::from_secs(60)).await;

        assert!(!engine.registry().is_active(&snapshot.id));
        assert_eq!(store.query_count(), 0);
        assert!(
            store
                .notices()
                .iter()
                .any(|(_, text)| text.contains("Invalid deletion window"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_channel_and_cancel() {
        let (engine, _) = engine();
        engine.start_recurring("10", Some(1), None).await.unwrap();
        let interval = engine
            .start_interval("10", 0, now_ms(), None)
            .await
            .unwrap();

        assert!(engine.cancel(&interval.id));
        assert!(!engine.cancel(&interval.id));

        let report = engine.stop_channel("10").await;
        assert_eq!(report.halted, 1);
        assert_eq!(report.channel_name, "general");
        assert_eq!(engine.stop_channel("10").await.halted, 0);
        assert_eq!(engine.stop_channel("unknown").await.halted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_page() {
        let (engine, _) = engine();
        assert_eq!(engine.status_page(1), "No active deletion routines.");

        engine.start_recurring("10", Some(7), None).await.unwrap();
        let page = engine.status_page(1);
        assert!(page.contains("general"));
        assert!(page.contains("older than 7 days"));
        assert!(page.ends_with("Page 1/1 (1 routines)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_halts_everything_and_refuses_new_work() {
        let (engine, _) = engine();
        engine.start_recurring("10", Some(1), None).await.unwrap();
        engine.start_recurring("10", Some(2), None).await.unwrap();

        assert_eq!(engine.shutdown(Duration::from_secs(5)).await, 2);
        assert!(engine.list().is_empty());
        assert!(matches!(
            engine.start_recurring("10", Some(1), None).await,
            Err(EngineError::ShuttingDown)
        ));
    }
}
