//! Shared in-memory collaborators for integration tests

#![allow(dead_code)]

use chrono::DateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tape_gc::collaborators::{
    DiskReplicaScanner, NamespaceService, PoolInventory, PoolStats, ReplicaDeleter,
    ReplicaLocation, ReplicaSeed,
};
use tape_gc::{FileId, Result, TapeGcError};

/// A single pool whose used bytes shrink as replicas are deleted
pub struct InMemoryPool {
    pub name: String,
    stats: Mutex<PoolStats>,
    config: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<FileId, u64>>,
    failing_deletes: Mutex<HashSet<FileId>>,
    deleted: Mutex<Vec<FileId>>,
    pub stats_queries: AtomicU64,
}

impl InMemoryPool {
    pub fn new(name: &str, total_bytes: u64, used_bytes: u64) -> Self {
        Self {
            name: name.to_string(),
            stats: Mutex::new(PoolStats {
                total_bytes,
                used_bytes,
            }),
            config: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
            stats_queries: AtomicU64::new(0),
        }
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.config
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_used_bytes(&self, used_bytes: u64) {
        self.stats.lock().unwrap().used_bytes = used_bytes;
    }

    pub fn add_file(&self, fid: FileId, size_bytes: u64) {
        self.files.lock().unwrap().insert(fid, size_bytes);
    }

    pub fn fail_deletes_of(&self, fid: FileId) {
        self.failing_deletes.lock().unwrap().insert(fid);
    }

    pub fn deleted(&self) -> Vec<FileId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn free_bytes(&self) -> u64 {
        self.stats.lock().unwrap().free_bytes()
    }
}

impl NamespaceService for InMemoryPool {
    fn resolve_replica(&self, fid: FileId) -> Result<ReplicaLocation> {
        self.files
            .lock()
            .unwrap()
            .get(&fid)
            .map(|&size_bytes| ReplicaLocation {
                fs_id: 1,
                size_bytes,
            })
            .ok_or_else(|| TapeGcError::FileNotFound(format!("fid={}", fid)))
    }
}

impl PoolInventory for InMemoryPool {
    fn pool_stats(&self, pool: &str) -> Result<PoolStats> {
        self.stats_queries.fetch_add(1, Ordering::SeqCst);
        if pool != self.name {
            return Err(TapeGcError::PoolNotFound(pool.to_string()));
        }
        Ok(*self.stats.lock().unwrap())
    }

    fn pool_config_value(&self, _pool: &str, key: &str) -> Result<Option<String>> {
        Ok(self.config.lock().unwrap().get(key).cloned())
    }
}

impl ReplicaDeleter for InMemoryPool {
    fn delete_disk_replica(&self, fid: FileId, location: &ReplicaLocation) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(&fid) {
            return Err(TapeGcError::DeleteFailed(format!("fid={}", fid)));
        }
        if self.files.lock().unwrap().remove(&fid).is_none() {
            return Err(TapeGcError::FileNotFound(format!("fid={}", fid)));
        }
        let mut stats = self.stats.lock().unwrap();
        stats.used_bytes = stats.used_bytes.saturating_sub(location.size_bytes);
        self.deleted.lock().unwrap().push(fid);
        Ok(())
    }
}

/// Reports every file still on disk, with the fid as its ctime in seconds
impl DiskReplicaScanner for InMemoryPool {
    fn disk_replicas(
        &self,
        spaces: &BTreeSet<String>,
        stop: &AtomicBool,
        nb_files_scanned: &AtomicU64,
    ) -> Result<BTreeMap<String, Vec<ReplicaSeed>>> {
        let mut replicas = BTreeMap::new();
        if !spaces.contains(&self.name) {
            return Ok(replicas);
        }

        let mut seeds = Vec::new();
        for &fid in self.files.lock().unwrap().keys() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            nb_files_scanned.fetch_add(1, Ordering::Relaxed);
            seeds.push(ReplicaSeed {
                fid,
                ctime: DateTime::from_timestamp(fid as i64, 0).unwrap(),
            });
        }
        replicas.insert(self.name.clone(), seeds);
        Ok(replicas)
    }
}
