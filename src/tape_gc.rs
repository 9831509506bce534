//! Tape-Aware Garbage Collector Module
//!
//! Frees disk space in one pool by removing the disk replicas of the least
//! recently used tape-backed files. The tape copy is never touched.
//!
//! Request-handling threads report file opens, replica commits and
//! conversions, which feed an [`AccessTracker`]. At startup the queue can be
//! seeded with replicas already on disk, behind anything accessed since. A single worker thread polls the pool's free space
//! and, while it is below the configured minimum, evicts one replica per poll.
//!
//! Lifecycle: `Disabled -> Enabled -> Stopping -> Stopped`. The worker is
//! spawned at most once, by the first call to [`TapeGc::enable`], and joined
//! at most once, by [`TapeGc::stop`] or drop.

use crate::access_tracker::{AccessTracker, FileId};
use crate::cached_config_value::CachedConfigValue;
use crate::clock::Clock;
use crate::collaborators::{
    FileMetadata, NamespaceService, PoolInventory, ReplicaDeleter, ReplicaSeed,
};
use crate::config::{pool_config_u64, TapeGcConfig, MIN_FREE_BYTES_KEY, TOTAL_BYTES_KEY};
use crate::free_space_monitor::FreeSpaceMonitor;
use crate::freed_bytes_histogram::{FreedBytesHistogram, MAX_BIN_WIDTH_SECS};
use crate::shutdown::StopSignal;
use crate::stats::TapeGcStats;
use crate::{Result, TapeGcError};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Run state of a garbage collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GcRunState {
    Disabled = 0,
    Enabled = 1,
    Stopping = 2,
    Stopped = 3,
}

impl GcRunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => GcRunState::Disabled,
            1 => GcRunState::Enabled,
            2 => GcRunState::Stopping,
            _ => GcRunState::Stopped,
        }
    }
}

/// Outcome of one garbage collection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcAttempt {
    /// The pool is smaller than the capacity required before collecting
    CapacityBelowThreshold { total_bytes: u64, min_total_bytes: u64 },
    /// Free space is at or above the configured minimum
    NotNeeded { free_bytes: u64, min_free_bytes: u64 },
    /// Space is needed but no candidate is queued
    QueueEmpty,
    /// A disk replica was deleted
    Evicted { fid: FileId, size_bytes: u64 },
    /// The candidate could not be evicted and has been dropped from the queue
    Failed { fid: FileId, reason: String },
}

/// State shared between the coordinator and its worker thread
struct GcCore {
    space: String,
    config: TapeGcConfig,
    namespace: Arc<dyn NamespaceService>,
    deleter: Arc<dyn ReplicaDeleter>,
    lru: AccessTracker,
    free_space: FreeSpaceMonitor,
    min_free_bytes: CachedConfigValue<u64>,
    min_total_bytes: CachedConfigValue<u64>,
    freed_bytes: Mutex<FreedBytesHistogram>,
    nb_evicts: AtomicU64,
    state: AtomicU8,
    stop: StopSignal,
}

/// Tape-aware garbage collector for a single space
pub struct TapeGc {
    core: Arc<GcCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TapeGc {
    /// Create a disabled garbage collector for `space`.
    ///
    /// Fails if the configuration is invalid, including a zero queue size.
    pub fn new(
        space: &str,
        config: TapeGcConfig,
        namespace: Arc<dyn NamespaceService>,
        inventory: Arc<dyn PoolInventory>,
        deleter: Arc<dyn ReplicaDeleter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let lru = AccessTracker::new(config.max_queue_size)?;
        config.validate().map_err(TapeGcError::ConfigError)?;

        let free_space = FreeSpaceMonitor::new(
            space,
            inventory.clone(),
            clock.clone(),
            config.default_query_period,
            config.config_cache_max_age,
            config.free_bytes_script_timeout,
        );

        let pool_setting = |key: &'static str, default: u64| {
            let inventory = inventory.clone();
            let space = space.to_string();
            CachedConfigValue::new(default, config.config_cache_max_age, clock.clone(), move || {
                Ok(pool_config_u64(inventory.as_ref(), &space, key, default))
            })
        };
        let min_free_bytes = pool_setting(MIN_FREE_BYTES_KEY, config.default_min_free_bytes);
        let min_total_bytes = pool_setting(TOTAL_BYTES_KEY, config.default_total_bytes);

        let bin_width_secs = u32::try_from(config.freed_bytes_histogram_bin_width.as_secs())
            .map_err(|_| TapeGcError::InvalidBinWidth {
                max: MAX_BIN_WIDTH_SECS,
            })?;
        let freed_bytes =
            FreedBytesHistogram::new(config.freed_bytes_histogram_nb_bins, bin_width_secs, clock)?;

        Ok(Self {
            core: Arc::new(GcCore {
                space: space.to_string(),
                config,
                namespace,
                deleter,
                lru,
                free_space,
                min_free_bytes,
                min_total_bytes,
                freed_bytes: Mutex::new(freed_bytes),
                nb_evicts: AtomicU64::new(0),
                state: AtomicU8::new(GcRunState::Disabled as u8),
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn space(&self) -> &str {
        &self.core.space
    }

    pub fn state(&self) -> GcRunState {
        self.core.state()
    }

    /// Enable the collector and start its worker thread.
    ///
    /// Only the first call has an effect; later and concurrent calls return
    /// immediately. Fails only if the worker thread cannot be spawned.
    pub fn enable(&self) -> Result<()> {
        if self
            .core
            .state
            .compare_exchange(
                GcRunState::Disabled as u8,
                GcRunState::Enabled as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!(space = %self.core.space, "Tape-aware garbage collector already enabled");
            return Ok(());
        }

        let mut worker = self.lock_worker();
        if self.core.stop.is_stop_requested() {
            return Ok(());
        }

        let core = self.core.clone();
        let handle = std::thread::Builder::new()
            .name(format!("tgc-{}", self.core.space))
            .spawn(move || core.run())
            .map_err(|e| {
                TapeGcError::ThreadError(format!(
                    "Failed to spawn garbage collector worker for space {}: {}",
                    self.core.space, e
                ))
            })?;
        *worker = Some(handle);

        info!(space = %self.core.space, "Tape-aware garbage collector enabled");
        Ok(())
    }

    /// Record that a file has been opened
    pub fn file_opened(&self, path: &str, metadata: &FileMetadata) {
        self.file_accessed("opened", path, metadata);
    }

    /// Record that a disk replica of a file has been committed
    pub fn file_replica_committed(&self, path: &str, metadata: &FileMetadata) {
        self.file_accessed("replica committed", path, metadata);
    }

    /// Record that a file has been converted into this space
    pub fn file_converted(&self, path: &str, metadata: &FileMetadata) {
        self.file_accessed("converted", path, metadata);
    }

    fn file_accessed(&self, event: &str, path: &str, metadata: &FileMetadata) {
        if self.core.state() != GcRunState::Enabled {
            return;
        }
        debug!(space = %self.core.space, fid = metadata.fid, path, "File {}", event);
        self.core.lru.file_accessed(metadata.fid);
    }

    /// Queue disk replicas found on startup behind every file already
    /// accessed, oldest `ctime` evicted first.
    ///
    /// Returns how many were queued. Ignored unless the collector is
    /// enabled, and stops early once the queue is full.
    pub fn seed_queue(&self, mut replicas: Vec<ReplicaSeed>) -> usize {
        if self.core.state() != GcRunState::Enabled {
            return 0;
        }

        replicas.sort_by(|a, b| b.ctime.cmp(&a.ctime));
        let nb_seeded = self
            .core
            .lru
            .files_seeded(replicas.iter().map(|replica| replica.fid));

        info!(
            space = %self.core.space,
            nb_seeded,
            nb_found = replicas.len(),
            "Seeded access queue with existing disk replicas"
        );
        nb_seeded
    }

    /// Run one garbage collection attempt on the caller's thread
    pub fn try_to_garbage_collect_a_single_file(&self) -> Result<GcAttempt> {
        self.core.try_to_garbage_collect_a_single_file()
    }

    /// Stop the worker thread and wait for it to exit.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) {
        self.core.stop.request_stop();

        let mut worker = self.lock_worker();
        if self.core.state() == GcRunState::Stopped {
            return;
        }
        self.core
            .state
            .store(GcRunState::Stopping as u8, Ordering::SeqCst);

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!(space = %self.core.space, "Garbage collector worker panicked");
            }
        }

        self.core
            .state
            .store(GcRunState::Stopped as u8, Ordering::SeqCst);
        info!(space = %self.core.space, "Tape-aware garbage collector stopped");
    }

    pub fn stats(&self) -> TapeGcStats {
        let snapshot = self.core.free_space.snapshot();
        let freed_bytes_last_minute = {
            let mut histogram = self.core.lock_freed_bytes();
            let history_secs = histogram.nb_bins() as u64 * u64::from(histogram.bin_width_secs());
            histogram
                .nb_bytes_freed_in_last_nb_secs(history_secs.min(60))
                .unwrap_or(0)
        };

        TapeGcStats {
            nb_evicts: self.core.nb_evicts.load(Ordering::Relaxed),
            lru_queue_size: self.core.lru.size() as u64,
            max_queue_size_exceeded: self.core.lru.max_queue_size_exceeded(),
            total_bytes: snapshot.total_bytes,
            free_bytes: snapshot.free_bytes,
            query_timestamp: snapshot.query_timestamp,
            freed_bytes_last_minute,
        }
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TapeGc {
    fn drop(&mut self) {
        self.stop();
    }
}

impl GcCore {
    fn state(&self) -> GcRunState {
        GcRunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn lock_freed_bytes(&self) -> std::sync::MutexGuard<'_, FreedBytesHistogram> {
        self.freed_bytes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn min_free_bytes(&self) -> u64 {
        let read = self.min_free_bytes.get_with_change();
        if read.changed {
            info!(
                space = %self.space,
                min_free_bytes = read.value,
                "Minimum free bytes configuration changed"
            );
        }
        read.value
    }

    /// Worker loop, runs until a stop is requested
    fn run(&self) {
        info!(space = %self.space, "Tape-aware garbage collector worker started");

        while self.state() == GcRunState::Enabled && !self.stop.is_stop_requested() {
            match self.try_to_garbage_collect_a_single_file() {
                Ok(GcAttempt::Failed { fid, reason }) => {
                    warn!(space = %self.space, fid, "Failed to evict disk replica: {}", reason);
                }
                Ok(attempt) => {
                    debug!(space = %self.space, "Garbage collection attempt: {:?}", attempt);
                }
                Err(e) => {
                    warn!(space = %self.space, "Garbage collection attempt failed: {}", e);
                }
            }

            if self.stop.wait_for_stop(self.config.poll_interval) {
                break;
            }
        }

        info!(space = %self.space, "Tape-aware garbage collector worker finished");
    }

    fn try_to_garbage_collect_a_single_file(&self) -> Result<GcAttempt> {
        let min_free_bytes = self.min_free_bytes();
        let min_total_bytes = self.min_total_bytes.get();
        let free_bytes = self.free_space.get_free_bytes()?;

        let total_bytes = self.free_space.snapshot().total_bytes;
        if total_bytes < min_total_bytes {
            return Ok(GcAttempt::CapacityBelowThreshold {
                total_bytes,
                min_total_bytes,
            });
        }

        if free_bytes >= min_free_bytes {
            return Ok(GcAttempt::NotNeeded {
                free_bytes,
                min_free_bytes,
            });
        }

        if self.lru.empty() {
            debug!(
                space = %self.space,
                free_bytes,
                min_free_bytes,
                "Space is needed but there are no files to evict"
            );
            return Ok(GcAttempt::QueueEmpty);
        }

        // The worker is the only consumer, so the queue cannot drain between
        // the emptiness check and the pop
        let fid = self.lru.get_and_pop_fid_of_least_used_file()?;

        let location = match self.namespace.resolve_replica(fid) {
            Ok(location) => location,
            Err(e) => {
                info!(
                    space = %self.space,
                    fid,
                    "Not evicting file that can no longer be resolved: {}",
                    e
                );
                return Ok(GcAttempt::Failed {
                    fid,
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = self.deleter.delete_disk_replica(fid, &location) {
            return Ok(GcAttempt::Failed {
                fid,
                reason: e.to_string(),
            });
        }

        self.free_space.file_queued_for_deletion(location.size_bytes);
        self.nb_evicts.fetch_add(1, Ordering::Relaxed);
        self.lock_freed_bytes().bytes_freed(location.size_bytes);

        info!(
            space = %self.space,
            fid,
            fs_id = location.fs_id,
            bytes = location.size_bytes,
            free_bytes,
            min_free_bytes,
            "Evicted disk replica"
        );

        Ok(GcAttempt::Evicted {
            fid,
            size_bytes: location.size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::collaborators::{PoolStats, ReplicaLocation};
    use std::collections::{HashMap, HashSet};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeCluster {
        stats: Mutex<PoolStats>,
        config: Mutex<HashMap<String, String>>,
        files: Mutex<HashMap<FileId, u64>>,
        failing_deletes: Mutex<HashSet<FileId>>,
        deleted: Mutex<Vec<FileId>>,
    }

    impl FakeCluster {
        fn new(total_bytes: u64, used_bytes: u64, min_free_bytes: u64) -> Arc<Self> {
            let cluster = Arc::new(Self::default());
            *cluster.stats.lock().unwrap() = PoolStats {
                total_bytes,
                used_bytes,
            };
            cluster.config.lock().unwrap().insert(
                MIN_FREE_BYTES_KEY.to_string(),
                min_free_bytes.to_string(),
            );
            cluster
        }

        fn add_file(&self, fid: FileId, size_bytes: u64) {
            self.files.lock().unwrap().insert(fid, size_bytes);
        }

        fn deleted(&self) -> Vec<FileId> {
            self.deleted.lock().unwrap().clone()
        }
    }

    impl NamespaceService for FakeCluster {
        fn resolve_replica(&self, fid: FileId) -> Result<ReplicaLocation> {
            self.files
                .lock()
                .unwrap()
                .get(&fid)
                .map(|&size_bytes| ReplicaLocation { fs_id: 1, size_bytes })
                .ok_or_else(|| TapeGcError::FileNotFound(format!("fid={}", fid)))
        }
    }

    impl PoolInventory for FakeCluster {
        fn pool_stats(&self, pool: &str) -> Result<PoolStats> {
            if pool != "tape" {
                return Err(TapeGcError::PoolNotFound(pool.to_string()));
            }
            Ok(*self.stats.lock().unwrap())
        }

        fn pool_config_value(&self, _pool: &str, key: &str) -> Result<Option<String>> {
            Ok(self.config.lock().unwrap().get(key).cloned())
        }
    }

    impl ReplicaDeleter for FakeCluster {
        fn delete_disk_replica(&self, fid: FileId, _location: &ReplicaLocation) -> Result<()> {
            if self.failing_deletes.lock().unwrap().contains(&fid) {
                return Err(TapeGcError::DeleteFailed(format!("fid={}", fid)));
            }
            self.deleted.lock().unwrap().push(fid);
            Ok(())
        }
    }

    fn metadata(fid: FileId) -> FileMetadata {
        FileMetadata {
            fid,
            size_bytes: 10,
            tape_backed: true,
        }
    }

    fn gc_with(space: &str, cluster: Arc<FakeCluster>, config: TapeGcConfig) -> TapeGc {
        TapeGc::new(
            space,
            config,
            cluster.clone(),
            cluster.clone(),
            cluster,
            Arc::new(ManualClock::new()),
        )
        .unwrap()
    }

    fn slow_poll_config() -> TapeGcConfig {
        TapeGcConfig {
            poll_interval: Duration::from_secs(3600),
            max_queue_size: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_queue_size_fails_construction() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let config = TapeGcConfig {
            max_queue_size: 0,
            ..Default::default()
        };
        let result = TapeGc::new(
            "tape",
            config,
            cluster.clone(),
            cluster.clone(),
            cluster,
            Arc::new(SystemClock),
        );
        assert_eq!(result.err(), Some(TapeGcError::MaxQueueSizeIsZero));
    }

    #[test]
    fn test_accesses_ignored_while_disabled() {
        let cluster = FakeCluster::new(1000, 900, 200);
        let gc = gc_with("tape", cluster, slow_poll_config());

        gc.file_opened("/eos/a", &metadata(1));
        gc.file_replica_committed("/eos/b", &metadata(2));
        assert_eq!(gc.state(), GcRunState::Disabled);
        assert_eq!(gc.stats().lru_queue_size, 0);
    }

    #[test]
    fn test_accesses_ignored_after_stop() {
        let cluster = FakeCluster::new(1000, 900, 200);
        let gc = gc_with("tape", cluster, slow_poll_config());
        gc.enable().unwrap();
        gc.file_opened("/eos/a", &metadata(1));
        gc.stop();

        gc.file_opened("/eos/b", &metadata(2));
        gc.file_converted("/eos/c", &metadata(3));
        assert_eq!(gc.state(), GcRunState::Stopped);
        assert_eq!(gc.core.lru.most_to_least_recent(), vec![1]);
    }

    #[test]
    fn test_converted_file_counts_as_access() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = gc_with("tape", cluster, slow_poll_config());
        gc.enable().unwrap();

        gc.file_opened("/eos/a", &metadata(1));
        gc.file_converted("/eos/b", &metadata(2));
        gc.file_converted("/eos/a", &metadata(1));
        assert_eq!(gc.core.lru.most_to_least_recent(), vec![1, 2]);
    }

    #[test]
    fn test_seeded_replicas_are_evicted_oldest_first_after_accessed_files() {
        let cluster = FakeCluster::new(1000, 900, 200);
        for fid in 1..=4 {
            cluster.add_file(fid, 10);
        }
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.enable().unwrap();
        gc.file_opened("/eos/a", &metadata(1));

        let at = |secs| chrono::DateTime::from_timestamp(secs, 0).unwrap();
        let seeds = vec![
            ReplicaSeed { fid: 2, ctime: at(200) },
            ReplicaSeed { fid: 3, ctime: at(100) },
            ReplicaSeed { fid: 4, ctime: at(300) },
            ReplicaSeed { fid: 1, ctime: at(50) },
        ];
        assert_eq!(gc.seed_queue(seeds), 4);
        assert_eq!(gc.core.lru.most_to_least_recent(), vec![1, 4, 2, 3]);

        for expected in [3, 2, 4, 1] {
            let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
            assert!(matches!(attempt, GcAttempt::Evicted { fid, .. } if fid == expected));
        }
    }

    #[test]
    fn test_seeding_ignored_unless_enabled() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = gc_with("tape", cluster, slow_poll_config());
        let seed = ReplicaSeed {
            fid: 1,
            ctime: chrono::Utc::now(),
        };
        assert_eq!(gc.seed_queue(vec![seed]), 0);
        assert_eq!(gc.stats().lru_queue_size, 0);
    }

    #[test]
    fn test_seeding_stops_when_queue_is_full() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let config = TapeGcConfig {
            max_queue_size: 2,
            ..slow_poll_config()
        };
        let gc = gc_with("tape", cluster, config);
        gc.enable().unwrap();

        let now = chrono::Utc::now();
        let seeds = (1..=5).map(|fid| ReplicaSeed { fid, ctime: now }).collect();
        assert_eq!(gc.seed_queue(seeds), 2);
        assert!(gc.stats().max_queue_size_exceeded);
    }

    #[test]
    fn test_small_pool_is_not_collected() {
        let cluster = FakeCluster::new(1000, 900, 200);
        cluster.add_file(1, 30);
        cluster
            .config
            .lock()
            .unwrap()
            .insert(TOTAL_BYTES_KEY.to_string(), "5000".to_string());
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.core.lru.file_accessed(1);

        assert_eq!(
            gc.try_to_garbage_collect_a_single_file().unwrap(),
            GcAttempt::CapacityBelowThreshold {
                total_bytes: 1000,
                min_total_bytes: 5000
            }
        );
        assert!(cluster.deleted().is_empty());
        assert_eq!(gc.core.lru.size(), 1);
    }

    #[test]
    fn test_pool_at_capacity_threshold_is_collected() {
        let cluster = FakeCluster::new(1000, 900, 200);
        cluster.add_file(1, 30);
        let config = TapeGcConfig {
            default_total_bytes: 1000,
            ..slow_poll_config()
        };
        let gc = gc_with("tape", cluster.clone(), config);
        gc.core.lru.file_accessed(1);

        assert!(matches!(
            gc.try_to_garbage_collect_a_single_file().unwrap(),
            GcAttempt::Evicted { fid: 1, .. }
        ));
    }

    #[test]
    fn test_bin_width_beyond_u32_is_rejected() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let config = TapeGcConfig {
            freed_bytes_histogram_bin_width: Duration::from_secs(u64::from(u32::MAX) + 1),
            ..slow_poll_config()
        };
        let result = TapeGc::new(
            "tape",
            config,
            cluster.clone(),
            cluster.clone(),
            cluster,
            Arc::new(ManualClock::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_enable_is_idempotent() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = gc_with("tape", cluster, slow_poll_config());

        gc.enable().unwrap();
        gc.enable().unwrap();
        assert_eq!(gc.state(), GcRunState::Enabled);

        gc.file_opened("/eos/a", &metadata(1));
        gc.file_replica_committed("/eos/b", &metadata(2));
        assert_eq!(gc.stats().lru_queue_size, 2);
    }

    #[test]
    fn test_concurrent_enable_spawns_one_worker() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = Arc::new(gc_with("tape", cluster, slow_poll_config()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gc = gc.clone();
                std::thread::spawn(move || gc.enable().unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(gc.state(), GcRunState::Enabled);
        assert!(gc.lock_worker().is_some());
        gc.stop();
        assert_eq!(gc.state(), GcRunState::Stopped);
    }

    #[test]
    fn test_stop_returns_promptly_despite_long_poll_interval() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = gc_with("tape", cluster, slow_poll_config());
        gc.enable().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let start = Instant::now();
        gc.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(gc.state(), GcRunState::Stopped);

        // Second stop is a no-op
        gc.stop();
        assert_eq!(gc.state(), GcRunState::Stopped);
    }

    #[test]
    fn test_stop_before_enable_prevents_start() {
        let cluster = FakeCluster::new(1000, 0, 0);
        let gc = gc_with("tape", cluster, slow_poll_config());

        gc.stop();
        gc.enable().unwrap();
        assert_eq!(gc.state(), GcRunState::Stopped);
        assert!(gc.lock_worker().is_none());
    }

    #[test]
    fn test_no_eviction_when_threshold_is_zero() {
        let cluster = FakeCluster::new(1000, 1000, 0);
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.core.lru.file_accessed(1);

        let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
        assert_eq!(
            attempt,
            GcAttempt::NotNeeded {
                free_bytes: 0,
                min_free_bytes: 0
            }
        );
        assert!(cluster.deleted().is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used_file() {
        let cluster = FakeCluster::new(1000, 900, 200);
        cluster.add_file(1, 30);
        cluster.add_file(2, 40);
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.core.lru.file_accessed(1);
        gc.core.lru.file_accessed(2);

        let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
        assert_eq!(
            attempt,
            GcAttempt::Evicted {
                fid: 1,
                size_bytes: 30
            }
        );
        assert_eq!(cluster.deleted(), vec![1]);

        let stats = gc.stats();
        assert_eq!(stats.nb_evicts, 1);
        assert_eq!(stats.lru_queue_size, 1);
        assert_eq!(stats.free_bytes, 70);
        assert_eq!(stats.total_bytes, 1000);
        assert_eq!(stats.freed_bytes_last_minute, 30);
    }

    #[test]
    fn test_unresolvable_file_is_dropped_not_requeued() {
        let cluster = FakeCluster::new(1000, 900, 200);
        cluster.add_file(2, 40);
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.core.lru.file_accessed(1);
        gc.core.lru.file_accessed(2);

        let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
        assert!(matches!(attempt, GcAttempt::Failed { fid: 1, .. }));
        assert_eq!(gc.core.lru.most_to_least_recent(), vec![2]);

        let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
        assert!(matches!(attempt, GcAttempt::Evicted { fid: 2, .. }));
    }

    #[test]
    fn test_failed_delete_is_not_counted() {
        let cluster = FakeCluster::new(1000, 900, 200);
        cluster.add_file(1, 30);
        cluster.failing_deletes.lock().unwrap().insert(1);
        let gc = gc_with("tape", cluster.clone(), slow_poll_config());
        gc.core.lru.file_accessed(1);

        let attempt = gc.try_to_garbage_collect_a_single_file().unwrap();
        assert!(matches!(attempt, GcAttempt::Failed { fid: 1, .. }));
        assert_eq!(gc.stats().nb_evicts, 0);
        assert_eq!(gc.stats().free_bytes, 100);
        assert_eq!(gc.core.lru.size(), 0);
    }

    #[test]
    fn test_empty_queue_reported() {
        let cluster = FakeCluster::new(1000, 900, 200);
        let gc = gc_with("tape", cluster, slow_poll_config());
        assert_eq!(
            gc.try_to_garbage_collect_a_single_file().unwrap(),
            GcAttempt::QueueEmpty
        );
    }

    #[test]
    fn test_unknown_pool_propagates_from_attempt() {
        let cluster = FakeCluster::new(1000, 900, 200);
        let gc = gc_with("disk", cluster, slow_poll_config());
        assert_eq!(
            gc.try_to_garbage_collect_a_single_file(),
            Err(TapeGcError::PoolNotFound("disk".to_string()))
        );
    }

    #[test]
    fn test_worker_survives_unknown_pool() {
        let cluster = FakeCluster::new(1000, 900, 200);
        let config = TapeGcConfig {
            poll_interval: Duration::from_millis(5),
            max_queue_size: 100,
            ..Default::default()
        };
        let gc = gc_with("disk", cluster, config);
        gc.enable().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(gc.state(), GcRunState::Enabled);
        gc.stop();
        assert_eq!(gc.state(), GcRunState::Stopped);
    }
}
