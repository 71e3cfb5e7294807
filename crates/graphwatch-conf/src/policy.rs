//! Policy configuration - seeds runtime behaviour at startup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default-node memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Remember configured default devices and restore them when they reappear.
    /// Default: true
    #[serde(default = "PolicyConfig::default_default_nodes")]
    pub default_nodes: bool,

    /// Idle time after the last change before the state file is written.
    /// Default: 1000
    #[serde(default = "PolicyConfig::default_save_interval_ms")]
    pub save_interval_ms: u64,
}

impl PolicyConfig {
    fn default_default_nodes() -> bool {
        true
    }

    fn default_save_interval_ms() -> u64 {
        1000
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_nodes: Self::default_default_nodes(),
            save_interval_ms: Self::default_save_interval_ms(),
        }
    }
}
