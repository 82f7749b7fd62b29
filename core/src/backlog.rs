//! Neighbor transmit backlog: second-hand congestion hints
//!
//! Each beacon may carry the sender's queued byte count. The tracker keeps the
//! latest report per neighbor and never evicts: staleness is judged by the
//! delay estimator when a report is read, not when it ages.

use crate::geometry::NodeId;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Link-layer view beneath a router
#[cfg_attr(test, mockall::automock)]
pub trait LinkLayer: Send + Sync {
    /// Bytes queued across every egress queue below this node
    fn local_backlog_bytes(&self) -> u64;

    /// Transmit bitrate of a neighbor's radio in bits per second, if resolvable
    fn neighbor_bitrate(&self, node_id: &NodeId) -> Option<f64>;
}

/// Last backlog report heard from a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub node_id: NodeId,
    pub bytes: u32,
    pub observed_at: Timestamp,
}

/// Report returned by a lookup, with its age at lookup time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogReport {
    pub bytes: u32,
    pub age: Duration,
}

#[derive(Debug, Default)]
pub struct BacklogTracker {
    reports: BTreeMap<NodeId, BacklogEntry>,
    /// Number of local backlog reads, for diagnostics
    local_reads: AtomicU64,
}

impl BacklogTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a neighbor's report, replacing the previous one
    pub fn record(&mut self, node_id: NodeId, bytes: u32, now: Timestamp) {
        self.reports.insert(
            node_id,
            BacklogEntry {
                node_id,
                bytes,
                observed_at: now,
            },
        );
    }

    /// Latest report for a neighbor together with its age at `now`
    pub fn lookup(&self, node_id: &NodeId, now: Timestamp) -> Option<BacklogReport> {
        self.reports.get(node_id).map(|entry| BacklogReport {
            bytes: entry.bytes,
            age: now.saturating_sub(entry.observed_at),
        })
    }

    pub fn entry(&self, node_id: &NodeId) -> Option<&BacklogEntry> {
        self.reports.get(node_id)
    }

    /// Read the local queue depth from the link layer
    pub fn local_backlog_bytes(&self, link: &dyn LinkLayer) -> u64 {
        self.local_reads.fetch_add(1, Ordering::Relaxed);
        link.local_backlog_bytes()
    }

    pub fn local_reads(&self) -> u64 {
        self.local_reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
