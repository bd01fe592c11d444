//! Deletion engine configuration.
//!
//! Controls pacing, recurrence and paging for every deletion routine.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! throttle_ms = 1000
//! recurrence_hours = 6
//! page_size = 100
//! default_max_age_days = 30
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::store::MAX_PAGE_SIZE;

/// Longest allowed recurrence period, in hours.
pub const MAX_RECURRENCE_HOURS: u64 = 24 * 366;

/// Deletion engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fixed delay before every history query and every delete call.
    /// Default: 1000 ms
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// How long a recurring routine waits between cycles.
    /// Default: 6 hours
    #[serde(default = "default_recurrence_hours")]
    pub recurrence_hours: u64,

    /// Messages requested per history page. Must be between 1 and 100.
    /// Default: 100
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Age used when a recurring request does not name one.
    /// Default: 30 days
    #[serde(default = "default_max_age_days")]
    pub default_max_age_days: u32,

    /// Routines shown per status report page.
    #[serde(default = "default_report_page_size")]
    pub report_page_size: usize,

    /// How long shutdown waits for runners and pending notices.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            recurrence_hours: default_recurrence_hours(),
            page_size: default_page_size(),
            default_max_age_days: default_max_age_days(),
            report_page_size: default_report_page_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn recurrence(&self) -> Duration {
        Duration::from_secs(self.recurrence_hours.saturating_mul(3600))
    }

    /// Human-readable recurrence period used in notices, e.g. "6 hours".
    pub fn recurrence_label(&self) -> String {
        match self.recurrence_hours {
            1 => "1 hour".to_string(),
            hours => format!("{hours} hours"),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Validation(format!(
                "engine.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.recurrence_hours == 0 || self.recurrence_hours > MAX_RECURRENCE_HOURS {
            return Err(ConfigError::Validation(format!(
                "engine.recurrence_hours must be between 1 and {MAX_RECURRENCE_HOURS}, got {}",
                self.recurrence_hours
            )));
        }
        if self.default_max_age_days == 0 {
            return Err(ConfigError::Validation(
                "engine.default_max_age_days must be positive".into(),
            ));
        }
        if self.report_page_size == 0 {
            return Err(ConfigError::Validation(
                "engine.report_page_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_throttle_ms() -> u64 {
    1000
}

fn default_recurrence_hours() -> u64 {
    6
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_max_age_days() -> u32 {
    30
}

fn default_report_page_size() -> usize {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.throttle(), Duration::from_secs(1));
        assert_eq!(config.recurrence(), Duration::from_secs(6 * 3600));
        assert_eq!(config.recurrence_label(), "6 hours");
        assert_eq!(config.page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_hour_label() {
        let config = EngineConfig {
            recurrence_hours: 1,
            ..Default::default()
        };
        assert_eq!(config.recurrence_label(), "1 hour");
    }

    #[test]
    fn test_page_size_bounds() {
        for page_size in [0, 101] {
            let config = EngineConfig {
                page_size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "page_size {page_size}");
        }
    }

    #[test]
    fn test_recurrence_bounds() {
        for recurrence_hours in [0, MAX_RECURRENCE_HOURS + 1, u64::MAX] {
            let config = EngineConfig {
                recurrence_hours,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "recurrence_hours {recurrence_hours}");
        }

        let config = EngineConfig {
            recurrence_hours: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.recurrence(), Duration::from_secs(u64::MAX));
    }
}
