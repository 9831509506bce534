//! Garbage collector statistics
//!
//! Point-in-time snapshots exposed to monitoring. Snapshots serialize to JSON
//! and render as `key=value` lines per space, after a `tgc.is_active` line.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics of one tape-aware garbage collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TapeGcStats {
    /// Disk replicas successfully evicted since start
    pub nb_evicts: u64,
    /// Files currently waiting in the access queue
    pub lru_queue_size: u64,
    pub max_queue_size_exceeded: bool,
    /// Pool capacity as last reported by the inventory
    pub total_bytes: u64,
    /// Cached free bytes including local corrections
    pub free_bytes: u64,
    /// When the inventory was last queried, if ever
    pub query_timestamp: Option<DateTime<Utc>>,
    pub freed_bytes_last_minute: u64,
}

impl TapeGcStats {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Render `tgc.is_active=true|false` followed by one `tgc.stats=<name>`
/// line per metric. The metric lines are left out when no space has a
/// collector.
pub fn render_stats_lines(is_gc_active: bool, stats: &BTreeMap<String, TapeGcStats>) -> String {
    let mut out = format!("tgc.is_active={}\n", is_gc_active);
    if stats.is_empty() {
        return out;
    }

    let metrics: [(&str, fn(&TapeGcStats) -> String); 5] = [
        ("evicts", |s| s.nb_evicts.to_string()),
        ("queuesize", |s| s.lru_queue_size.to_string()),
        ("totalbytes", |s| s.total_bytes.to_string()),
        ("availbytes", |s| s.free_bytes.to_string()),
        ("qrytimestamp", |s| {
            s.query_timestamp
                .map(|t| t.timestamp().to_string())
                .unwrap_or_else(|| "0".to_string())
        }),
    ];

    for (name, value_of) in metrics {
        out.push_str("tgc.stats=");
        out.push_str(name);
        for (space, space_stats) in stats {
            out.push_str(&format!(" {}={}", space, value_of(space_stats)));
        }
        out.push('\n');
    }
    out
}
