#![allow(dead_code)]

pub mod counting;
pub mod messages;

use std::thread;
use std::time::{Duration, Instant};

use unibus::BusConfig;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A configuration with short intervals so tests settle quickly.
pub fn fast_config(worker_count: usize) -> BusConfig {
    BusConfig {
        worker_count,
        idle_poll_interval_ms: 5,
        receive_timeout_ms: 5,
        dispose_grace_ms: 2_000,
    }
}

/// Poll `condition` until it holds or `deadline_ms` elapses.
pub fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
