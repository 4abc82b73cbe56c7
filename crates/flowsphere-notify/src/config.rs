//! Notification configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the toast queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Maximum number of toasts visible at once
    pub limit: usize,

    /// Milliseconds before a toast dismisses itself
    pub duration_ms: u64,

    /// Number of past toasts kept for inspection
    pub history_limit: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            duration_ms: 5000,
            history_limit: 100,
        }
    }
}

impl NotifyConfig {
    /// Auto-dismiss delay
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
