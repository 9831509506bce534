//! Shutdown Signal Module
//!
//! Cooperative stop flag for worker threads. A worker waits on the signal
//! between iterations instead of sleeping, so a stop request wakes it
//! immediately and shutdown latency is bounded by a single wait.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Stop flag paired with a condition variable
#[derive(Debug, Default)]
pub struct StopSignal {
    stop_requested: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake every waiter
    pub fn request_stop(&self) {
        let mut stop_requested = self.lock();
        *stop_requested = true;
        self.condvar.notify_all();
    }

    /// Check if a stop has been requested (non-blocking)
    pub fn is_stop_requested(&self) -> bool {
        *self.lock()
    }

    /// Wait until a stop is requested or `timeout` elapses.
    ///
    /// Returns true if a stop has been requested.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stop_requested = self.lock();

        // Loop to absorb spurious wakeups
        while !*stop_requested {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(stop_requested, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stop_requested = guard;
        }

        *stop_requested
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.stop_requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
