//! Routines launched when the process starts.
//!
//! # Example
//!
//! ```toml
//! [startup]
//! default_deletions = '[[30, "123456789"], [7, "987654321"]]'
//! report_channel = "123456789"
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartupConfig {
    /// Batch of `[max_age_days, channel]` pairs, as JSON.
    #[serde(default)]
    pub default_deletions: Option<String>,

    /// Channel that receives notices for startup routines. Defaults to each
    /// routine's own channel.
    #[serde(default)]
    pub report_channel: Option<String>,
}
