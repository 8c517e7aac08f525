//! Bus configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for a bus and its workers.
///
/// Durations are carried as integer milliseconds so configuration
/// files stay plain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of workers spawned by `start()`.
    pub worker_count: usize,
    /// How long a non-working (created or paused) worker sleeps
    /// between control checks.
    pub idle_poll_interval_ms: u64,
    /// Upper bound on one blocking receive attempt.
    pub receive_timeout_ms: u64,
    /// How long `shutdown` waits for each worker before flagging it.
    pub dispose_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            idle_poll_interval_ms: 100,
            receive_timeout_ms: 100,
            dispose_grace_ms: 2_000,
        }
    }
}

impl BusConfig {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn dispose_grace(&self) -> Duration {
        Duration::from_millis(self.dispose_grace_ms)
    }
}
