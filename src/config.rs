//! Tunables for the drop subsystem
//!
//! Hosts may hand over a JSON object; every field is optional and falls back to the
//! values below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for a drop target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropConfig {
    /// Minimum gap between two accepted drops. A legacy `WM_DROPFILES` arriving
    /// sooner than this after the previous drop is treated as a duplicate of it.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// First delay before a re-registration sweep that was blocked by an active
    /// drag session is retried.
    #[serde(default = "default_retry_initial_ms")]
    pub reregister_retry_initial_ms: u64,
    /// Upper bound for the doubling retry delay.
    #[serde(default = "default_retry_max_ms")]
    pub reregister_retry_max_ms: u64,
    /// Overrides the build default for the logging toggle when set.
    #[serde(default)]
    pub logging_enabled: Option<bool>,
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_retry_initial_ms() -> u64 {
    16
}

fn default_retry_max_ms() -> u64 {
    250
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            reregister_retry_initial_ms: default_retry_initial_ms(),
            reregister_retry_max_ms: default_retry_max_ms(),
            logging_enabled: None,
        }
    }
}

impl DropConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(self.reregister_retry_initial_ms),
            max: Duration::from_millis(self.reregister_retry_max_ms.max(self.reregister_retry_initial_ms)),
        }
    }
}

/// Exponential back-off for the deferred re-registration sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        DropConfig::default().retry_policy()
    }
}
