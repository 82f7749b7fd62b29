//! Periodic position advertisements and their timer arithmetic

use crate::config::RoutingConfig;
use crate::directory::PositionDirectory;
use crate::geometry::{NodeId, Position};
use crate::Timestamp;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size of the backlog field on the wire
const BACKLOG_FIELD_BYTES: usize = 4;

/// Advertisement sent to every node in radio range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub address: NodeId,
    pub position: Position,
    /// Sender's queued bytes, present when congestion awareness is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_backlog_bytes: Option<u32>,
}

impl Beacon {
    pub fn new(address: NodeId, position: Position) -> Self {
        Self {
            address,
            position,
            tx_backlog_bytes: None,
        }
    }

    pub fn with_backlog(mut self, bytes: u32) -> Self {
        self.tx_backlog_bytes = Some(bytes);
        self
    }

    /// Chunk length: address, position and the backlog field
    pub fn encoded_length(address_byte_length: usize, position_byte_length: usize) -> usize {
        address_byte_length + position_byte_length + BACKLOG_FIELD_BYTES
    }
}

/// Jittered delay until the next beacon: interval + U(-1, 1) × max jitter
pub fn next_beacon_delay<R: Rng + ?Sized>(config: &RoutingConfig, rng: &mut R) -> Duration {
    let offset = rng.gen_range(-1.0..=1.0) * config.max_jitter_secs;
    Duration::from_secs_f64((config.beacon_interval_secs + offset).max(0.0))
}

/// Instant the oldest neighbor expires, `None` when there are no neighbors
pub fn next_neighbor_expiration(
    neighbors: &PositionDirectory,
    validity: Duration,
) -> Option<Timestamp> {
    neighbors
        .oldest_observation()
        .map(|oldest| oldest + validity)
}

/// Entries observed before this instant are expired at `now`.
///
/// An entry expires once its age reaches `validity`, so a purge run at the
/// instant returned by [`next_neighbor_expiration`] always removes something.
pub fn expiry_cutoff(now: Timestamp, validity: Duration) -> Timestamp {
    (now + Duration::from_nanos(1)).saturating_sub(validity)
}
