//! Position directory: node identity to last-known location
//!
//! Two instances exist per deployment:
//! - the neighbor directory, owned by one router and fed by received beacons,
//!   purged eagerly once entries outlive the neighbor validity interval
//! - the location service, shared by every router and used to resolve the
//!   coordinates of a destination at origination time; never purged
//!
//! Iteration follows `NodeId` order, which keeps every scan over the
//! directory reproducible.

use crate::geometry::{NodeId, Position};
use crate::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("No position known for {0}")]
    NotFound(NodeId),
}

/// One observation of a node's location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub node_id: NodeId,
    pub position: Position,
    /// When the position was last observed
    pub observed_at: Timestamp,
}

/// Mapping from node identity to its latest observed position
#[derive(Debug, Clone, Default)]
pub struct PositionDirectory {
    entries: BTreeMap<NodeId, DirectoryEntry>,
}

impl PositionDirectory {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record an observation, replacing any previous one for the same node
    pub fn set(&mut self, node_id: NodeId, position: Position, now: Timestamp) {
        self.entries.insert(
            node_id,
            DirectoryEntry {
                node_id,
                position,
                observed_at: now,
            },
        );
    }

    pub fn get(&self, node_id: &NodeId) -> Result<Position, DirectoryError> {
        self.entries
            .get(node_id)
            .map(|entry| entry.position)
            .ok_or(DirectoryError::NotFound(*node_id))
    }

    pub fn entry(&self, node_id: &NodeId) -> Option<&DirectoryEntry> {
        self.entries.get(node_id)
    }

    pub fn has_position(&self, node_id: &NodeId) -> bool {
        self.entries.contains_key(node_id)
    }

    /// Every known node, in ascending identity order
    pub fn all_ids(&self) -> Vec<NodeId> {
        self.entries.keys().copied().collect()
    }

    /// Entries in ascending identity order
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    /// Oldest observation time, or `None` when empty (an infinitely distant instant)
    pub fn oldest_observation(&self) -> Option<Timestamp> {
        self.entries.values().map(|entry| entry.observed_at).min()
    }

    /// Remove every entry observed strictly before `cutoff`, returning how many went
    pub fn purge_older_than(&mut self, cutoff: Timestamp) -> usize {
        let initial_count = self.entries.len();
        self.entries.retain(|_, entry| entry.observed_at >= cutoff);
        initial_count - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Directory service used to resolve any node's location
///
/// Stands in for a location-discovery protocol. Every router writes its own
/// position and every position it overhears, and reads destination positions
/// when originating traffic.
pub trait LocationService: Send + Sync {
    fn store(&self, node_id: NodeId, position: Position, now: Timestamp);

    fn lookup(&self, node_id: &NodeId) -> Option<Position>;
}

/// In-memory location service shared by reference between routers
#[derive(Debug, Clone, Default)]
pub struct SharedDirectory {
    inner: Arc<RwLock<PositionDirectory>>,
}

impl SharedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl LocationService for SharedDirectory {
    fn store(&self, node_id: NodeId, position: Position, now: Timestamp) {
        self.inner.write().set(node_id, position, now);
    }

    fn lookup(&self, node_id: &NodeId) -> Option<Position> {
        self.inner.read().get(node_id).ok()
    }
}
