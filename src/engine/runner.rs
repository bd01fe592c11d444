//! Routine runner: drives one routine through its query and delete cycles.
//!
//! ```text
//! Querying -> Deleting -> Waiting -> Querying ...   (recurring)
//! Querying -> Deleting -> Terminated                (interval)
//! ```
//!
//! The runner checks registry membership before and after every page fetch,
//! before every delete and after every sleep. A store call that is already
//! in flight always completes before cancellation is noticed.

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};

use super::{
    EngineError, Notices, Routine, RoutineMode, RoutineRegistry, RoutineStatus, Throttle, Window,
    threshold, throttle::pause,
};
use crate::{
    config::EngineConfig,
    observability::metrics,
    store::{Message, MessageStore, StoreError},
};

/// Paging and recurrence settings shared by all runners.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub page_size: usize,
    pub recurrence: Duration,
    /// Recurrence period as shown in notices, e.g. "6 hours".
    pub recurrence_label: String,
}

impl From<&EngineConfig> for RunnerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            page_size: config.page_size,
            recurrence: config.recurrence(),
            recurrence_label: config.recurrence_label(),
        }
    }
}

/// How a runner exited.
#[derive(Debug)]
pub enum RoutineOutcome {
    /// Interval routine finished its cycle, or found an empty channel.
    Completed { deleted: u64 },
    /// Deregistered from outside.
    Cancelled,
    /// Aborted by an error. The requester has been notified.
    Failed(EngineError),
}

impl RoutineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Results from a single query-and-delete cycle.
#[derive(Debug, Default)]
struct CycleResult {
    found: usize,
    deleted: u64,
    /// Set when a delete was refused for lack of permission.
    denied: Option<StoreError>,
}

enum CycleStep {
    Finished(CycleResult),
    /// The channel has no messages at all.
    EmptyChannel,
    /// Deregistered mid-cycle. `unfinished` is set once the seed was read.
    Halted { unfinished: bool },
}

pub struct RoutineRunner {
    registry: RoutineRegistry,
    store: Arc<dyn MessageStore>,
    notices: Notices,
    throttle: Throttle,
    settings: RunnerSettings,
}

impl RoutineRunner {
    pub fn new(
        registry: RoutineRegistry,
        store: Arc<dyn MessageStore>,
        notices: Notices,
        throttle: Throttle,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            registry,
            store,
            notices,
            throttle,
            settings,
        }
    }

    /// Run `routine` until it terminates or is deregistered.
    ///
    /// The routine is always deregistered when this returns.
    pub async fn run(&self, routine: Arc<Routine>) -> RoutineOutcome {
        tracing::info!(
            routine_id = %routine.id,
            channel_id = %routine.channel_id,
            mode = routine.mode().as_str(),
            window = %routine.threshold.describe(),
            "Starting deletion routine"
        );

        let outcome = self.drive(&routine).await;

        routine.set_status(RoutineStatus::Terminated);
        self.registry.remove_by_id(&routine.id);
        metrics::record_routine_finished(routine.mode().as_str(), outcome.label());

        match &outcome {
            RoutineOutcome::Completed { deleted } => tracing::info!(
                routine_id = %routine.id,
                deleted,
                "Deletion routine finished"
            ),
            RoutineOutcome::Cancelled => tracing::info!(
                routine_id = %routine.id,
                deleted = routine.deleted_count(),
                "Deletion routine cancelled"
            ),
            RoutineOutcome::Failed(e) => tracing::error!(
                routine_id = %routine.id,
                error = %e,
                "Deletion routine failed"
            ),
        }

        outcome
    }

    /// Membership check performed at every cancellation point.
    fn checkpoint(&self, routine: &Routine) -> bool {
        self.registry.is_active(&routine.id)
    }

    async fn drive(&self, routine: &Routine) -> RoutineOutcome {
        let mode = routine.mode();

        loop {
            let started = tokio::time::Instant::now();

            let step = match self.run_cycle(routine).await {
                Ok(step) => step,
                Err(e) => {
                    self.notices.send(
                        &routine.report_to,
                        format!(
                            "Deletion routine {} in {} stopped: {e}",
                            routine.id, routine.channel_name
                        ),
                    );
                    return RoutineOutcome::Failed(e);
                }
            };

            match step {
                CycleStep::Halted { unfinished } => {
                    if unfinished {
                        self.notices.send(
                            &routine.report_to,
                            format!(
                                "Deletion process halted in {}, but deletion round is unfinished.",
                                routine.channel_name
                            ),
                        );
                    }
                    return RoutineOutcome::Cancelled;
                }
                CycleStep::EmptyChannel => {
                    self.notices
                        .send(&routine.report_to, "No messages found! No messages deleted.");
                    if mode == RoutineMode::IntervalOnce {
                        return RoutineOutcome::Completed { deleted: 0 };
                    }
                }
                CycleStep::Finished(result) => {
                    metrics::record_cycle(
                        mode.as_str(),
                        result.deleted,
                        started.elapsed().as_secs_f64(),
                    );
                    self.report_cycle(routine, &result);
                    if mode == RoutineMode::IntervalOnce {
                        return RoutineOutcome::Completed {
                            deleted: routine.deleted_count(),
                        };
                    }
                }
            }

            routine.record_cycle();
            let next_run = TimeDelta::from_std(self.settings.recurrence)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .unwrap_or_else(Utc::now);
            routine.set_status(RoutineStatus::Waiting { next_run });
            tracing::debug!(
                routine_id = %routine.id,
                cycles = routine.cycle_count(),
                next_run = %next_run,
                "Waiting for next cycle"
            );

            if !pause(self.settings.recurrence, routine.cancel_token()).await
                || !self.checkpoint(routine)
            {
                return RoutineOutcome::Cancelled;
            }
        }
    }

    fn report_cycle(&self, routine: &Routine, result: &CycleResult) {
        let repeat = match routine.mode() {
            RoutineMode::Recurring => format!("Will repeat in {}.", self.settings.recurrence_label),
            RoutineMode::IntervalOnce => "Will NOT repeat.".to_string(),
        };

        let text = match &result.denied {
            Some(e) => format!(
                "Deletion process stopped in {}: {e}. Deleted {} of {} messages. {repeat}",
                routine.channel_name, result.deleted, result.found
            ),
            None => format!(
                "Deletion process finished. Successfully deleted {} in {}. {repeat}",
                result.deleted, routine.channel_name
            ),
        };
        self.notices.send(&routine.report_to, text);
    }

    fn query_failure(&self, routine: &Routine, source: StoreError) -> EngineError {
        metrics::record_query_failure(source.kind());
        EngineError::QueryFailure {
            channel: routine.channel_id.clone(),
            source,
        }
    }

    async fn run_cycle(&self, routine: &Routine) -> Result<CycleStep, EngineError> {
        let window = routine.threshold.resolve(threshold::now_ms())?;
        let channel = &routine.channel_id;
        let cancel = routine.cancel_token();

        routine.set_status(RoutineStatus::Querying { found: 0 });

        if !self.throttle.pace(cancel).await || !self.checkpoint(routine) {
            return Ok(CycleStep::Halted { unfinished: false });
        }
        let seed = self
            .store
            .fetch_latest(channel)
            .await
            .map_err(|e| self.query_failure(routine, e))?;
        let Some(seed) = seed else {
            tracing::debug!(routine_id = %routine.id, "Channel has no messages");
            return Ok(CycleStep::EmptyChannel);
        };

        let Some(mut matches) = self.collect_matches(routine, seed, &window).await? else {
            return Ok(CycleStep::Halted { unfinished: true });
        };

        let found = matches.len();
        tracing::info!(
            routine_id = %routine.id,
            channel_id = %channel,
            found,
            "Query complete"
        );
        self.notices.send(
            &routine.report_to,
            format!(
                "Messages found in {} that were {}: {found}. Deleting...",
                routine.channel_name,
                routine.threshold.describe()
            ),
        );

        // Oldest first
        matches.reverse();

        let mut result = CycleResult {
            found,
            ..Default::default()
        };

        for (index, message) in matches.iter().enumerate() {
            let remaining = found - index;
            routine.set_status(RoutineStatus::Deleting {
                remaining,
                eta_secs: self.throttle.estimate(remaining).as_secs(),
            });

            if !self.throttle.pace(cancel).await || !self.checkpoint(routine) {
                return Ok(CycleStep::Halted { unfinished: true });
            }

            match self.store.delete_message(channel, &message.id).await {
                Ok(()) => {
                    result.deleted += 1;
                    routine.record_deletion();
                    metrics::record_message_deleted();
                }
                Err(e) if e.is_authorization() => {
                    metrics::record_delete_failure(e.kind());
                    tracing::warn!(
                        routine_id = %routine.id,
                        message_id = %message.id,
                        error = %e,
                        "Delete refused, ending this round"
                    );
                    result.denied = Some(e);
                    break;
                }
                Err(e) => {
                    metrics::record_delete_failure(e.kind());
                    tracing::warn!(
                        routine_id = %routine.id,
                        message_id = %message.id,
                        error = %e,
                        "Failed to delete message, skipping"
                    );
                }
            }
        }

        Ok(CycleStep::Finished(result))
    }

    /// Page backwards from `seed`, keeping messages inside `window`, newest first.
    ///
    /// Returns `None` if the routine was deregistered along the way.
    async fn collect_matches(
        &self,
        routine: &Routine,
        seed: Message,
        window: &Window,
    ) -> Result<Option<Vec<Message>>, EngineError> {
        let channel = &routine.channel_id;
        let cancel = routine.cancel_token();
        let mut cursor = seed.id.clone();
        let mut matches = Vec::new();
        if window.contains(seed.created_timestamp) {
            matches.push(seed);
        }

        loop {
            if !self.throttle.pace(cancel).await || !self.checkpoint(routine) {
                return Ok(None);
            }
            let page = self
                .store
                .fetch_page(channel, &cursor, self.settings.page_size)
                .await
                .map_err(|e| self.query_failure(routine, e))?;
            if !self.checkpoint(routine) {
                return Ok(None);
            }

            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id.clone();
            matches.extend(
                page.into_iter()
                    .filter(|m| window.contains(m.created_timestamp)),
            );
            routine.set_status(RoutineStatus::Querying {
                found: matches.len(),
            });
            tracing::debug!(routine_id = %routine.id, found = matches.len(), "Fetched page");
        }

        Ok(Some(matches))
    }
}
