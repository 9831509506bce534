//! Multi-Space Tape GC Module
//!
//! Runs one [`TapeGc`] per tape-enabled space and routes file notifications
//! to the collector of the space that holds the replica. Only tape-backed
//! files are routed: a disk-only file has no other copy and must never become
//! an eviction candidate.

use crate::clock::Clock;
use crate::collaborators::{
    DiskReplicaScanner, FileMetadata, NamespaceService, PoolInventory, ReplicaDeleter,
};
use crate::config::TapeGcConfig;
use crate::stats::TapeGcStats;
use crate::tape_gc::{GcRunState, TapeGc};
use crate::{Result, TapeGcError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

type Collectors = Arc<DashMap<String, Arc<TapeGc>>>;

/// Configured spaces and run state, changed only under one lock so that
/// `set_tape_enabled_spaces`, `start` and `stop` never interleave
#[derive(Default)]
struct Lifecycle {
    started: bool,
    spaces: BTreeSet<String>,
    seeder: Option<JoinHandle<()>>,
}

pub struct MultiSpaceTapeGc {
    config: TapeGcConfig,
    namespace: Arc<dyn NamespaceService>,
    inventory: Arc<dyn PoolInventory>,
    deleter: Arc<dyn ReplicaDeleter>,
    clock: Arc<dyn Clock>,
    scanner: Option<Arc<dyn DiskReplicaScanner>>,
    gcs: Collectors,
    lifecycle: Mutex<Lifecycle>,
    stop_seeding: Arc<AtomicBool>,
    nb_files_scanned: Arc<AtomicU64>,
}

impl MultiSpaceTapeGc {
    pub fn new(
        config: TapeGcConfig,
        namespace: Arc<dyn NamespaceService>,
        inventory: Arc<dyn PoolInventory>,
        deleter: Arc<dyn ReplicaDeleter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            namespace,
            inventory,
            deleter,
            clock,
            scanner: None,
            gcs: Arc::new(DashMap::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            stop_seeding: Arc::new(AtomicBool::new(false)),
            nb_files_scanned: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seed each collector's queue from the disk replicas found by `scanner`
    /// every time the collectors are started
    pub fn with_disk_replica_scanner(mut self, scanner: Arc<dyn DiskReplicaScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Add the listed spaces to the configured set and create a collector
    /// for each one that does not have one yet.
    ///
    /// New collectors are enabled straight away if the collectors are
    /// started.
    pub fn set_tape_enabled_spaces(&self, spaces: &[String]) -> Result<()> {
        let mut lifecycle = self.lock_lifecycle();
        for space in spaces {
            lifecycle.spaces.insert(space.clone());
            let gc = self.collector(space)?;
            if lifecycle.started {
                gc.enable()?;
            }
        }
        Ok(())
    }

    /// Enable a collector for every configured space.
    ///
    /// Collectors removed by [`stop`](Self::stop) are created afresh, with
    /// empty queues and counters. If a disk replica scanner is set, a
    /// background thread seeds the new queues.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.started {
            return Ok(());
        }
        lifecycle.started = true;

        for space in &lifecycle.spaces {
            self.collector(space)?.enable()?;
        }

        if let Some(scanner) = &self.scanner {
            if !lifecycle.spaces.is_empty() {
                let seeder = self.spawn_seeder(scanner.clone(), lifecycle.spaces.clone())?;
                lifecycle.seeder = Some(seeder);
            }
        }

        info!(
            nb_spaces = lifecycle.spaces.len(),
            "Tape-aware garbage collection started"
        );
        Ok(())
    }

    /// Stop and remove the collectors of all configured spaces.
    ///
    /// The configured spaces are kept, so a later [`start`](Self::start)
    /// brings collection back.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        lifecycle.started = false;

        self.stop_seeding.store(true, Ordering::SeqCst);
        if let Some(seeder) = lifecycle.seeder.take() {
            if seeder.join().is_err() {
                error!("Disk replica seeding thread panicked");
            }
        }

        // Collect first so no map shard lock is held while joining workers
        let gcs: Vec<Arc<TapeGc>> = self.gcs.iter().map(|entry| entry.value().clone()).collect();
        self.gcs.clear();
        for gc in gcs {
            gc.stop();
        }
    }

    /// True if at least one collector is running
    pub fn is_gc_active(&self) -> bool {
        self.gcs
            .iter()
            .any(|entry| entry.value().state() == GcRunState::Enabled)
    }

    /// Names of the configured spaces, sorted
    pub fn spaces(&self) -> Vec<String> {
        self.lock_lifecycle().spaces.iter().cloned().collect()
    }

    /// Files examined so far by the most recent startup scan
    pub fn nb_files_scanned(&self) -> u64 {
        self.nb_files_scanned.load(Ordering::Relaxed)
    }

    pub fn file_opened(&self, space: &str, path: &str, metadata: &FileMetadata) {
        if let Some(gc) = self.gc_for(space, metadata) {
            gc.file_opened(path, metadata);
        }
    }

    pub fn file_replica_committed(&self, space: &str, path: &str, metadata: &FileMetadata) {
        if let Some(gc) = self.gc_for(space, metadata) {
            gc.file_replica_committed(path, metadata);
        }
    }

    pub fn file_converted(&self, space: &str, path: &str, metadata: &FileMetadata) {
        if let Some(gc) = self.gc_for(space, metadata) {
            gc.file_converted(path, metadata);
        }
    }

    /// Statistics of every space that currently has a collector
    pub fn stats(&self) -> BTreeMap<String, TapeGcStats> {
        self.gcs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Collector of `space`, created if missing
    fn collector(&self, space: &str) -> Result<Arc<TapeGc>> {
        match self.gcs.entry(space.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let gc = Arc::new(TapeGc::new(
                    space,
                    self.config.clone(),
                    self.namespace.clone(),
                    self.inventory.clone(),
                    self.deleter.clone(),
                    self.clock.clone(),
                )?);
                info!(space = %space, "Tape-aware garbage collection configured for space");
                Ok(entry.insert(gc).clone())
            }
        }
    }

    fn spawn_seeder(
        &self,
        scanner: Arc<dyn DiskReplicaScanner>,
        spaces: BTreeSet<String>,
    ) -> Result<JoinHandle<()>> {
        self.stop_seeding.store(false, Ordering::SeqCst);
        self.nb_files_scanned.store(0, Ordering::Relaxed);

        let gcs = self.gcs.clone();
        let stop = self.stop_seeding.clone();
        let nb_files_scanned = self.nb_files_scanned.clone();
        std::thread::Builder::new()
            .name("tgc-seed".to_string())
            .spawn(move || {
                seed_collectors(scanner.as_ref(), &gcs, &spaces, &stop, &nb_files_scanned)
            })
            .map_err(|e| {
                TapeGcError::ThreadError(format!(
                    "Failed to spawn disk replica seeding thread: {}",
                    e
                ))
            })
    }

    fn gc_for(&self, space: &str, metadata: &FileMetadata) -> Option<Arc<TapeGc>> {
        if !metadata.tape_backed {
            return None;
        }
        match self.gcs.get(space) {
            Some(gc) => Some(gc.value().clone()),
            None => {
                debug!(
                    space,
                    fid = metadata.fid,
                    "Ignoring file in space without tape-aware garbage collection"
                );
                None
            }
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn seed_collectors(
    scanner: &dyn DiskReplicaScanner,
    gcs: &DashMap<String, Arc<TapeGc>>,
    spaces: &BTreeSet<String>,
    stop: &AtomicBool,
    nb_files_scanned: &AtomicU64,
) {
    info!(?spaces, "Scanning namespace for existing disk replicas");
    let replicas = match scanner.disk_replicas(spaces, stop, nb_files_scanned) {
        Ok(replicas) => replicas,
        Err(e) => {
            warn!("Failed to scan namespace for disk replicas: {}", e);
            return;
        }
    };

    for (space, seeds) in replicas {
        if stop.load(Ordering::SeqCst) {
            info!("Disk replica seeding interrupted");
            return;
        }
        let gc = gcs.get(&space).map(|entry| entry.value().clone());
        match gc {
            Some(gc) => {
                gc.seed_queue(seeds);
            }
            None => debug!(space = %space, "Not seeding space without a collector"),
        }
    }

    info!(
        nb_files_scanned = nb_files_scanned.load(Ordering::Relaxed),
        "Finished seeding access queues"
    );
}

impl Drop for MultiSpaceTapeGc {
    fn drop(&mut self) {
        if self.is_gc_active() {
            warn!("Multi-space tape garbage collector dropped while active, stopping collectors");
        }
        self.stop();
    }
}
