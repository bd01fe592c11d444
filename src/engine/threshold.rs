//! Threshold policy: which messages a routine is allowed to delete.
//!
//! A recurring routine purges everything older than `max_age_days`,
//! re-evaluated against the clock at the start of every cycle. An interval
//! routine purges everything created strictly between two fixed timestamps.
//! All timestamps are epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EngineError, RoutineMode};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Threshold {
    /// Messages older than this many days.
    MaxAge { days: u32 },
    /// Messages created strictly between `older` and `younger`.
    Interval { older: i64, younger: i64 },
}

impl Threshold {
    pub fn max_age(days: u32) -> Result<Self, EngineError> {
        if days == 0 {
            return Err(EngineError::InvalidMaxAge);
        }
        Ok(Self::MaxAge { days })
    }

    /// Interval bounds are checked when the routine resolves its window,
    /// not here.
    pub fn interval(older: i64, younger: i64) -> Self {
        Self::Interval { older, younger }
    }

    pub fn mode(&self) -> RoutineMode {
        match self {
            Self::MaxAge { .. } => RoutineMode::Recurring,
            Self::Interval { .. } => RoutineMode::IntervalOnce,
        }
    }

    /// Compute the matching window at `now_ms`.
    pub fn resolve(&self, now_ms: i64) -> Result<Window, EngineError> {
        match *self {
            Self::MaxAge { days } => Ok(Window {
                older: 0,
                younger: now_ms.saturating_sub(i64::from(days) * MS_PER_DAY),
            }),
            Self::Interval { older, younger } => {
                if younger <= older {
                    return Err(EngineError::InvalidWindow { older, younger });
                }
                Ok(Window { older, younger })
            }
        }
    }

    /// Short description for reports, e.g. "older than 30 days".
    pub fn describe(&self) -> String {
        match *self {
            Self::MaxAge { days: 1 } => "older than 1 day".to_string(),
            Self::MaxAge { days } => format!("older than {days} days"),
            Self::Interval { older, younger } => {
                format!("between {} and {}", format_ms(older), format_ms(younger))
            }
        }
    }
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Exclusive timestamp bounds for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub older: i64,
    pub younger: i64,
}

impl Window {
    pub fn contains(&self, created_timestamp: i64) -> bool {
        self.older < created_timestamp && created_timestamp < self.younger
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[rstest]
    #[case::thirty_one_days(31, true)]
    #[case::exactly_thirty_days(30, false)]
    #[case::twenty_nine_days(29, false)]
    fn test_max_age_boundary(#[case] age_days: i64, #[case] matches: bool) {
        let window = Threshold::max_age(30).unwrap().resolve(NOW).unwrap();
        assert_eq!(window.contains(NOW - age_days * MS_PER_DAY), matches);
    }

    #[test]
    fn test_max_age_window_bounds() {
        let window = Threshold::max_age(1).unwrap().resolve(NOW).unwrap();
        assert_eq!(window.older, 0);
        assert_eq!(window.younger, NOW - MS_PER_DAY);
    }

    #[test]
    fn test_zero_max_age_rejected() {
        assert!(matches!(
            Threshold::max_age(0),
            Err(EngineError::InvalidMaxAge)
        ));
    }

    #[rstest]
    #[case::equal(100, 100)]
    #[case::reversed(200, 100)]
    fn test_invalid_interval(#[case] older: i64, #[case] younger: i64) {
        let err = Threshold::interval(older, younger).resolve(NOW).unwrap_err();
        assert!(matches!(err, EngineError::InvalidWindow { .. }));
    }

    #[rstest]
    #[case::at_older_bound(100, false)]
    #[case::inside(150, true)]
    #[case::at_younger_bound(200, false)]
    fn test_interval_bounds_are_exclusive(#[case] created: i64, #[case] matches: bool) {
        let window = Threshold::interval(100, 200).resolve(NOW).unwrap();
        assert_eq!(window.contains(created), matches);
    }

    #[test]
    fn test_mode() {
        assert_eq!(Threshold::max_age(3).unwrap().mode(), RoutineMode::Recurring);
        assert_eq!(Threshold::interval(1, 2).mode(), RoutineMode::IntervalOnce);
    }

    #[test]
    fn test_describe() {
        assert_eq!(Threshold::max_age(30).unwrap().describe(), "older than 30 days");
        assert_eq!(
            Threshold::interval(0, MS_PER_DAY).describe(),
            "between 1970-01-01 00:00:00 and 1970-01-02 00:00:00"
        );
    }

    #[test]
    fn test_describe_keeps_seconds_apart() {
        assert_eq!(
            Threshold::interval(1_000, 2_000).describe(),
            "between 1970-01-01 00:00:01 and 1970-01-01 00:00:02"
        );
    }
}
