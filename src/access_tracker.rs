//! Access Tracker Module
//!
//! Bounded least-recently-used queue of file identifiers. Files are pushed to
//! the front whenever they are opened or have a replica committed, and the
//! garbage collector pops eviction candidates from the back.
//!
//! The queue is a doubly linked list stored in a slab with a side index from
//! file id to slot, so access, move-to-front and pop are all O(1). When the
//! queue is full, new ids are rejected rather than displacing an older entry.
//!
//! Replicas already on disk when the collector starts are seeded at the back
//! of the queue, behind anything accessed since.

use crate::{Result, TapeGcError};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Stable identifier of a file in the namespace
pub type FileId = u64;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    fid: FileId,
    prev: usize,
    next: usize,
}

/// Unsynchronized LRU list, always accessed under the tracker's mutex
#[derive(Debug)]
struct LruList {
    nodes: Vec<Node>,
    free_slots: Vec<usize>,
    index: HashMap<FileId, usize>,
    head: usize,
    tail: usize,
    max_queue_size_exceeded: bool,
}

impl LruList {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_slots: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            max_queue_size_exceeded: false,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn unlink(&mut self, slot: usize) {
        let Node { prev, next, .. } = self.nodes[slot];
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }

    fn link_front(&mut self, slot: usize) {
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn link_back(&mut self, slot: usize) {
        self.nodes[slot].next = NIL;
        self.nodes[slot].prev = self.tail;
        if self.tail != NIL {
            self.nodes[self.tail].next = slot;
        }
        self.tail = slot;
        if self.head == NIL {
            self.head = slot;
        }
    }

    fn allocate(&mut self, fid: FileId) -> usize {
        let node = Node {
            fid,
            prev: NIL,
            next: NIL,
        };
        match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn access(&mut self, fid: FileId, max_queue_size: usize) -> bool {
        if let Some(&slot) = self.index.get(&fid) {
            if slot != self.head {
                self.unlink(slot);
                self.link_front(slot);
            }
            return true;
        }

        if self.len() >= max_queue_size {
            self.max_queue_size_exceeded = true;
            return false;
        }

        self.max_queue_size_exceeded = false;
        let slot = self.allocate(fid);
        self.link_front(slot);
        self.index.insert(fid, slot);
        true
    }

    fn seed(&mut self, fid: FileId, max_queue_size: usize) -> bool {
        if self.index.contains_key(&fid) {
            return true;
        }

        if self.len() >= max_queue_size {
            self.max_queue_size_exceeded = true;
            return false;
        }

        self.max_queue_size_exceeded = false;
        let slot = self.allocate(fid);
        self.link_back(slot);
        self.index.insert(fid, slot);
        true
    }

    fn pop_back(&mut self) -> Option<FileId> {
        if self.tail == NIL {
            return None;
        }
        let slot = self.tail;
        let fid = self.nodes[slot].fid;
        self.unlink(slot);
        self.index.remove(&fid);
        self.free_slots.push(slot);
        Some(fid)
    }

    fn front_to_back(&self) -> Vec<FileId> {
        let mut fids = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while cursor != NIL {
            fids.push(self.nodes[cursor].fid);
            cursor = self.nodes[cursor].next;
        }
        fids
    }
}

/// Thread-safe bounded LRU queue of file ids
#[derive(Debug)]
pub struct AccessTracker {
    max_queue_size: usize,
    inner: Mutex<LruList>,
}

impl AccessTracker {
    /// Create a tracker holding at most `max_queue_size` ids.
    ///
    /// Fails with [`TapeGcError::MaxQueueSizeIsZero`] if the size is zero.
    pub fn new(max_queue_size: usize) -> Result<Self> {
        if max_queue_size == 0 {
            return Err(TapeGcError::MaxQueueSizeIsZero);
        }
        Ok(Self {
            max_queue_size,
            inner: Mutex::new(LruList::new()),
        })
    }

    /// Record an access to `fid`, moving it to the front of the queue.
    ///
    /// A new id arriving while the queue is full is dropped and the overflow
    /// flag is raised. Returns false in that case.
    pub fn file_accessed(&self, fid: FileId) -> bool {
        let mut inner = self.lock();
        let was_exceeded = inner.max_queue_size_exceeded;
        let accepted = inner.access(fid, self.max_queue_size);
        if !accepted && !was_exceeded {
            warn!(
                fid,
                max_queue_size = self.max_queue_size,
                "Access queue is full, ignoring newly accessed files until space frees up"
            );
        }
        accepted
    }

    /// Append `fids`, most recent first, at the least recently used end of
    /// the queue in one step, so a concurrent pop never sees half a batch.
    ///
    /// Ids already queued keep their position. Stops at the first id
    /// rejected by the size limit of [`file_accessed`](Self::file_accessed)
    /// and returns how many ids were accepted before it.
    pub fn files_seeded<I>(&self, fids: I) -> usize
    where
        I: IntoIterator<Item = FileId>,
    {
        let mut inner = self.lock();
        let was_exceeded = inner.max_queue_size_exceeded;
        let mut nb_accepted = 0;
        for fid in fids {
            if !inner.seed(fid, self.max_queue_size) {
                if !was_exceeded {
                    warn!(
                        fid,
                        max_queue_size = self.max_queue_size,
                        "Access queue is full, not seeding further disk replicas"
                    );
                }
                break;
            }
            nb_accepted += 1;
        }
        nb_accepted
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Remove and return the least recently used id
    pub fn get_and_pop_fid_of_least_used_file(&self) -> Result<FileId> {
        self.lock().pop_back().ok_or(TapeGcError::QueueIsEmpty)
    }

    /// True if the most recent attempt to add a new id was rejected
    pub fn max_queue_size_exceeded(&self) -> bool {
        self.lock().max_queue_size_exceeded
    }

    /// Snapshot of the queue, most recently used first
    pub fn most_to_least_recent(&self) -> Vec<FileId> {
        self.lock().front_to_back()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruList> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
