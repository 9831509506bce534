//! External collaborators
//!
//! Interfaces to the services the garbage collector consumes but does not
//! implement: the namespace, the pool inventory, the privileged replica
//! delete operation and the startup scan of existing disk replicas.
//! Implementations must be safe to call from the worker
//! thread and from request-handling threads at the same time.

use crate::access_tracker::FileId;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64};

/// Where a disk-resident replica of a file lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    /// File system holding the replica
    pub fs_id: u32,
    /// Size of the file in bytes
    pub size_bytes: u64,
}

/// Capacity of a pool as reported by the inventory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl PoolStats {
    /// Bytes still available, never negative
    pub fn free_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

/// Metadata passed along with file open and replica commit notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub fid: FileId,
    pub size_bytes: u64,
    /// True if the file has a durable copy on tape
    pub tape_backed: bool,
}

/// Namespace lookups needed at eviction time
pub trait NamespaceService: Send + Sync {
    /// Resolve a file to its disk replica.
    ///
    /// Fails with `FileNotFound` if the file no longer exists or has been
    /// scheduled for deletion.
    fn resolve_replica(&self, fid: FileId) -> Result<ReplicaLocation>;
}

/// Pool capacity and per-pool configuration
pub trait PoolInventory: Send + Sync {
    /// Current capacity of `pool`, or `PoolNotFound`
    fn pool_stats(&self, pool: &str) -> Result<PoolStats>;

    /// Raw configuration value of `key` for `pool`, `None` if unset
    fn pool_config_value(&self, pool: &str, key: &str) -> Result<Option<String>>;
}

/// Privileged removal of a disk replica, leaving the tape copy untouched
pub trait ReplicaDeleter: Send + Sync {
    fn delete_disk_replica(&self, fid: FileId, location: &ReplicaLocation) -> Result<()>;
}

/// A disk replica found by the startup scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSeed {
    pub fid: FileId,
    /// Change time of the file, used as a stand-in for its last access
    pub ctime: DateTime<Utc>,
}

/// Scan of the namespace for files that already have disk replicas
pub trait DiskReplicaScanner: Send + Sync {
    /// Disk replicas of tape-backed files in each of `spaces`.
    ///
    /// Implementations check `stop` regularly and return early once it is
    /// set, and add one to `nb_files_scanned` per file examined.
    fn disk_replicas(
        &self,
        spaces: &BTreeSet<String>,
        stop: &AtomicBool,
        nb_files_scanned: &AtomicU64,
    ) -> Result<BTreeMap<String, Vec<ReplicaSeed>>>;
}
