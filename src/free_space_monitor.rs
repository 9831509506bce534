//! Free Space Monitor Module
//!
//! Keeps a TTL-cached view of the free bytes in one pool so that eviction
//! decisions do not hit the pool inventory on every poll. Deletions issued by
//! the collector are subtracted from the cached value straight away; the
//! estimate is replaced with the real figure on the next query.
//!
//! The query period itself is a per-pool setting, read through a
//! [`CachedConfigValue`] so operators can retune it at runtime. So is the
//! optional free bytes script: when a pool names one, its output replaces
//! the inventory's free figure. Total bytes always come from the inventory.

use crate::cached_config_value::CachedConfigValue;
use crate::clock::Clock;
use crate::collaborators::{PoolInventory, PoolStats};
use crate::config::{
    pool_config_string, pool_config_u64, FREE_BYTES_SCRIPT_KEY, QUERY_PERIOD_SECS_KEY,
};
use crate::free_bytes_script::run_free_bytes_script;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct FreeSpaceState {
    free_bytes: u64,
    total_bytes: u64,
    last_query: Option<Instant>,
    last_query_wall_clock: Option<DateTime<Utc>>,
}

/// Snapshot of what the monitor last learned about its pool
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FreeSpaceSnapshot {
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub query_timestamp: Option<DateTime<Utc>>,
}

/// TTL-cached free-byte count for a single pool
pub struct FreeSpaceMonitor {
    pool: String,
    inventory: Arc<dyn PoolInventory>,
    clock: Arc<dyn Clock>,
    query_period: CachedConfigValue<Duration>,
    free_bytes_script: CachedConfigValue<Option<String>>,
    script_timeout: Duration,
    state: Mutex<FreeSpaceState>,
}

impl FreeSpaceMonitor {
    /// Create a monitor for `pool`.
    ///
    /// `default_query_period` applies until the pool configures its own
    /// period. The configured period and script are re-read every
    /// `config_max_age`. A free bytes script is killed after `script_timeout`.
    pub fn new(
        pool: &str,
        inventory: Arc<dyn PoolInventory>,
        clock: Arc<dyn Clock>,
        default_query_period: Duration,
        config_max_age: Duration,
        script_timeout: Duration,
    ) -> Self {
        let query_period = {
            let inventory = inventory.clone();
            let pool = pool.to_string();
            let default_secs = default_query_period.as_secs();
            CachedConfigValue::new(
                default_query_period,
                config_max_age,
                clock.clone(),
                move || {
                    Ok(Duration::from_secs(pool_config_u64(
                        inventory.as_ref(),
                        &pool,
                        QUERY_PERIOD_SECS_KEY,
                        default_secs,
                    )))
                },
            )
        };

        let free_bytes_script = {
            let inventory = inventory.clone();
            let pool = pool.to_string();
            CachedConfigValue::new(None, config_max_age, clock.clone(), move || {
                Ok(pool_config_string(
                    inventory.as_ref(),
                    &pool,
                    FREE_BYTES_SCRIPT_KEY,
                ))
            })
        };

        Self {
            pool: pool.to_string(),
            inventory,
            clock,
            query_period,
            free_bytes_script,
            script_timeout,
            state: Mutex::new(FreeSpaceState::default()),
        }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Current query period, re-reading the pool configuration if stale
    pub fn query_period(&self) -> Duration {
        let read = self.query_period.get_with_change();
        if read.changed {
            info!(
                space = %self.pool,
                "Free space query period is now {}s",
                read.value.as_secs()
            );
        }
        read.value
    }

    /// Free bytes in the pool.
    ///
    /// Returns the cached figure while it is younger than the query period,
    /// otherwise asks the inventory, or the pool's free bytes script if it
    /// has one. Fails with `PoolNotFound` if the inventory does not know the
    /// pool. A failing script is logged and the inventory's figure is used.
    pub fn get_free_bytes(&self) -> Result<u64> {
        let query_period = self.query_period();

        {
            let state = self.lock();
            let fresh = matches!(
                state.last_query,
                Some(last) if self.clock.now().saturating_duration_since(last) < query_period
            );
            if fresh {
                return Ok(state.free_bytes);
            }
        }

        // The script may run for seconds, so query without holding the lock
        let stats: PoolStats = self.inventory.pool_stats(&self.pool)?;
        let free_bytes = match self.free_bytes_script.get() {
            Some(script) => {
                match run_free_bytes_script(&script, &self.pool, self.script_timeout) {
                    Ok(free_bytes) => free_bytes,
                    Err(e) => {
                        warn!(
                            space = %self.pool,
                            script = %script,
                            "Falling back to pool statistics: {}",
                            e
                        );
                        stats.free_bytes()
                    }
                }
            }
            None => stats.free_bytes(),
        };

        let mut state = self.lock();
        state.free_bytes = free_bytes;
        state.total_bytes = stats.total_bytes;
        state.last_query = Some(self.clock.now());
        state.last_query_wall_clock = Some(Utc::now());

        debug!(
            space = %self.pool,
            free_bytes = state.free_bytes,
            total_bytes = state.total_bytes,
            "Queried pool free space"
        );

        Ok(state.free_bytes)
    }

    /// Adjust the cached figure for a replica queued for deletion without
    /// asking the inventory. The count never drops below zero, and the next
    /// real query replaces it.
    pub fn file_queued_for_deletion(&self, size_bytes: u64) {
        let mut state = self.lock();
        state.free_bytes = state.free_bytes.saturating_sub(size_bytes);
    }

    pub fn snapshot(&self) -> FreeSpaceSnapshot {
        let state = self.lock();
        FreeSpaceSnapshot {
            free_bytes: state.free_bytes,
            total_bytes: state.total_bytes,
            query_timestamp: state.last_query_wall_clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FreeSpaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
