//! Tape GC - disk-capacity watchdog for tape-backed storage pools
//!
//! Every file in a tape-backed pool has a durable copy on tape and a cached
//! replica on disk. This library decides, under disk-space pressure, which
//! disk replicas to remove, using recency of access and a per-pool
//! free-space threshold.

pub mod access_tracker;
pub mod cached_config_value;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod free_bytes_script;
pub mod free_space_monitor;
pub mod freed_bytes_histogram;
pub mod logging;
pub mod multi_space_tape_gc;
pub mod shutdown;
pub mod stats;
pub mod tape_gc;

pub use access_tracker::{AccessTracker, FileId};
pub use error::{Result, TapeGcError};
pub use multi_space_tape_gc::MultiSpaceTapeGc;
pub use tape_gc::{GcAttempt, GcRunState, TapeGc};
