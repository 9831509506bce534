//! Cached Configuration Value Module
//!
//! Read-through TTL cache for a single configuration value. The value is
//! recomputed by a caller-supplied generator once it is older than its
//! maximum age. A failing generator leaves the previous value in place, and
//! the timestamp moves forward either way so retries happen at most once per
//! `max_age`.

use crate::clock::Clock;
use crate::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

type Generator<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Result of reading a cached value
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRead<T> {
    pub value: T,
    /// True if the generator produced a value different from the previous one
    pub changed: bool,
}

struct CachedState<T> {
    value: T,
    last_computed: Option<Instant>,
}

/// Generic TTL cache around one configuration value
pub struct CachedConfigValue<T> {
    state: Mutex<CachedState<T>>,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    generator: Generator<T>,
}

impl<T> CachedConfigValue<T>
where
    T: Clone + PartialEq + std::fmt::Debug,
{
    /// Create a cache holding `initial` until the first successful generation.
    ///
    /// The first call to [`get`](Self::get) always runs the generator.
    pub fn new<F>(initial: T, max_age: Duration, clock: Arc<dyn Clock>, generator: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(CachedState {
                value: initial,
                last_computed: None,
            }),
            max_age,
            clock,
            generator: Box::new(generator),
        }
    }

    /// Return the current value, regenerating it if it has expired
    pub fn get(&self) -> T {
        self.get_with_change().value
    }

    /// Return the current value and whether a regeneration changed it
    pub fn get_with_change(&self) -> CachedRead<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();

        let expired = match state.last_computed {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.max_age,
        };

        if !expired {
            return CachedRead {
                value: state.value.clone(),
                changed: false,
            };
        }

        state.last_computed = Some(now);

        match (self.generator)() {
            Ok(new_value) => {
                let changed = new_value != state.value;
                state.value = new_value;
                CachedRead {
                    value: state.value.clone(),
                    changed,
                }
            }
            Err(e) => {
                debug!(
                    "Cached value generator failed, keeping {:?}: {}",
                    state.value, e
                );
                CachedRead {
                    value: state.value.clone(),
                    changed: false,
                }
            }
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}
