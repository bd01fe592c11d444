//! Fixed-delay pacing for store calls.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Fixed delay applied before every history query and every delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait one throttle period.
    ///
    /// Returns `false` if `cancel` fired before the delay elapsed.
    pub async fn pace(&self, cancel: &CancellationToken) -> bool {
        pause(self.delay, cancel).await
    }

    /// Expected time to work through `remaining` throttled calls.
    pub fn estimate(&self, remaining: usize) -> Duration {
        self.delay
            .saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX))
    }
}

/// Sleep for `duration` unless `cancel` fires first. Returns `false` on cancellation.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
