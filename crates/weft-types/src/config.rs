//! Runtime configuration for the Weft engine.
//!
//! `WeftConfig` represents the engine section of a host's `config.toml`.
//! All fields have sensible defaults.

use serde::{Deserialize, Serialize};

/// Engine runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    /// Delay before a `NotReady` timer fire is retried, in milliseconds.
    #[serde(default = "default_timer_retry_interval_ms")]
    pub timer_retry_interval_ms: u64,

    /// Capacity of the broadcast engine-event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_timer_retry_interval_ms() -> u64 {
    50
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            timer_retry_interval_ms: default_timer_retry_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl WeftConfig {
    /// Timer retry interval as a std `Duration`.
    pub fn timer_retry_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timer_retry_interval_ms)
    }
}
