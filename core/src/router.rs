//! Node-level router: beacons, neighbor expiry and the datagram hooks
//!
//! The router never owns a clock or a timer. Every entry point takes `now`,
//! and every timer it wants armed comes back in the return value. The host
//! schedules and cancels the timers itself.

use crate::backlog::{BacklogTracker, LinkLayer};
use crate::beacon::{expiry_cutoff, next_beacon_delay, next_neighbor_expiration, Beacon};
use crate::config::{ConfigError, RoutingConfig};
use crate::delay::DelayEstimator;
use crate::directory::{LocationService, PositionDirectory};
use crate::engine::{NextHop, RoutingContext, RoutingEngine, RoutingError, RoutingStats};
use crate::geometry::{NodeId, Position};
use crate::option::RoutingOption;
use crate::packet::{Datagram, Destination, Verdict};
use crate::planar::Planarizer;
use crate::Timestamp;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouterError {
    #[error("Router already running")]
    AlreadyRunning,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Identity and location of the node a router runs on
pub trait LocalNode: Send + Sync {
    fn address(&self) -> NodeId;

    /// Current position, sampled from mobility on every call
    fn position(&self) -> Position;

    fn is_local_address(&self, node_id: &NodeId) -> bool {
        *node_id == self.address()
    }
}

/// Node with a settable position
#[derive(Debug)]
pub struct StaticNode {
    address: NodeId,
    position: RwLock<Position>,
}

impl StaticNode {
    pub fn new(address: NodeId, position: Position) -> Self {
        Self {
            address,
            position: RwLock::new(position),
        }
    }

    pub fn move_to(&self, position: Position) {
        *self.position.write() = position;
    }
}

impl LocalNode for StaticNode {
    fn address(&self) -> NodeId {
        self.address
    }

    fn position(&self) -> Position {
        *self.position.read()
    }
}

// ============================================================================
// TIMERS AND REPORTS
// ============================================================================

/// Timers a router asks its host to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterTimer {
    Beacon,
    PurgeNeighbors,
}

/// Result of a beacon timer tick
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconTick {
    /// Advertisement to send to every node in range
    pub beacon: Beacon,
    /// Delay before the next beacon tick
    pub next_beacon_in: Duration,
    /// When to run the purge timer, `None` to cancel it
    pub purge_at: Option<Timestamp>,
}

/// Snapshot of a router's tables and counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSummary {
    pub address: NodeId,
    pub running: bool,
    /// Neighbors currently in the directory
    pub neighbors: usize,
    /// Neighbors kept by planarization
    pub planar_neighbors: usize,
    /// Neighbors that ever reported a backlog
    pub backlog_entries: usize,
    pub stats: RoutingStats,
}

// ============================================================================
// ROUTER
// ============================================================================

pub struct GeoRouter {
    config: RoutingConfig,
    node: Arc<dyn LocalNode>,
    link: Arc<dyn LinkLayer>,
    location: Arc<dyn LocationService>,
    neighbors: PositionDirectory,
    backlog: BacklogTracker,
    engine: RoutingEngine,
    running: bool,
}

impl GeoRouter {
    pub fn new(
        config: RoutingConfig,
        node: Arc<dyn LocalNode>,
        link: Arc<dyn LinkLayer>,
        location: Arc<dyn LocationService>,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        let engine = RoutingEngine::new(
            config.enable_delay_tiebreaker,
            config.distance_equality_threshold,
        );
        Ok(Self {
            config,
            node,
            link,
            location,
            neighbors: PositionDirectory::new(),
            backlog: BacklogTracker::new(),
            engine,
            running: false,
        })
    }

    pub fn address(&self) -> NodeId {
        self.node.address()
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn neighbors(&self) -> &PositionDirectory {
        &self.neighbors
    }

    pub fn backlog(&self) -> &BacklogTracker {
        &self.backlog
    }

    pub fn stats(&self) -> &RoutingStats {
        self.engine.stats()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Bytes one beacon chunk occupies on the air
    pub fn beacon_length(&self) -> usize {
        Beacon::encoded_length(NodeId::BYTE_LENGTH, self.config.position_byte_length)
    }

    /// Bytes the routing option adds to every routed datagram
    pub fn option_length(&self) -> usize {
        RoutingOption::encoded_length(NodeId::BYTE_LENGTH, self.config.position_byte_length)
    }

    // ------------------------------------------------------------------------
    // LIFECYCLE
    // ------------------------------------------------------------------------

    /// Bring the router up; returns the delay before the first beacon
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<Duration, RouterError> {
        if self.running {
            return Err(RouterError::AlreadyRunning);
        }

        self.store_self_position(now);
        self.running = true;
        info!(
            "Router {} started at {} (interfaces {:?}, egress {})",
            self.node.address(),
            self.node.position(),
            self.config.interfaces,
            self.config.output_interface
        );
        Ok(next_beacon_delay(&self.config, rng))
    }

    /// Orderly shutdown; returns the timers to cancel
    pub fn stop(&mut self) -> Vec<RouterTimer> {
        if !self.running {
            return Vec::new();
        }
        info!("Router {} stopping", self.node.address());
        self.shut_down()
    }

    /// Abrupt failure; state is lost the same way as on stop
    pub fn crash(&mut self) -> Vec<RouterTimer> {
        if !self.running {
            return Vec::new();
        }
        info!("Router {} crashed", self.node.address());
        self.shut_down()
    }

    fn shut_down(&mut self) -> Vec<RouterTimer> {
        self.neighbors.clear();
        self.running = false;
        vec![RouterTimer::Beacon, RouterTimer::PurgeNeighbors]
    }

    // ------------------------------------------------------------------------
    // BEACONS
    // ------------------------------------------------------------------------

    /// Advertisement describing this node right now
    pub fn create_beacon(&self) -> Beacon {
        let beacon = Beacon::new(self.node.address(), self.node.position());
        if !self.config.enable_queue_delay {
            return beacon;
        }
        let queued = self.backlog.local_backlog_bytes(self.link.as_ref());
        beacon.with_backlog(u32::try_from(queued).unwrap_or(u32::MAX))
    }

    /// Beacon timer fired: build the beacon and re-arm both timers
    pub fn on_beacon_timer<R: Rng + ?Sized>(&mut self, now: Timestamp, rng: &mut R) -> BeaconTick {
        let beacon = self.create_beacon();
        self.store_self_position(now);
        debug!(
            "Beacon from {} at {} (backlog {:?})",
            beacon.address, beacon.position, beacon.tx_backlog_bytes
        );
        BeaconTick {
            beacon,
            next_beacon_in: next_beacon_delay(&self.config, rng),
            purge_at: self.next_neighbor_expiration(),
        }
    }

    /// Learn a neighbor from its beacon; returns when to run the purge timer
    pub fn on_beacon_received(&mut self, beacon: &Beacon, now: Timestamp) -> Option<Timestamp> {
        if !self.running {
            debug!(
                "Router {} is down, ignoring beacon from {}",
                self.node.address(),
                beacon.address
            );
            return None;
        }
        if self.node.is_local_address(&beacon.address) {
            return self.next_neighbor_expiration();
        }

        self.neighbors.set(beacon.address, beacon.position, now);
        self.location.store(beacon.address, beacon.position, now);
        if let Some(bytes) = beacon.tx_backlog_bytes {
            self.backlog.record(beacon.address, bytes, now);
        }
        self.next_neighbor_expiration()
    }

    /// Purge timer fired: drop expired neighbors and re-arm
    pub fn on_purge_timer(&mut self, now: Timestamp) -> Option<Timestamp> {
        let cutoff = expiry_cutoff(now, self.config.neighbor_validity());
        let removed = self.neighbors.purge_older_than(cutoff);
        if removed > 0 {
            debug!(
                "Router {} purged {} neighbors, {} left",
                self.node.address(),
                removed,
                self.neighbors.len()
            );
        }
        self.next_neighbor_expiration()
    }

    pub fn next_neighbor_expiration(&self) -> Option<Timestamp> {
        next_neighbor_expiration(&self.neighbors, self.config.neighbor_validity())
    }

    fn store_self_position(&self, now: Timestamp) {
        self.location
            .store(self.node.address(), self.node.position(), now);
    }

    // ------------------------------------------------------------------------
    // DATAGRAM HOOKS
    // ------------------------------------------------------------------------

    /// Datagram received for relaying
    pub fn on_forward(
        &mut self,
        datagram: &mut Datagram,
        now: Timestamp,
    ) -> Result<Verdict, RouterError> {
        let Some(destination) = self.routed_destination(datagram) else {
            return Ok(Verdict::Accept);
        };
        if !self.running {
            warn!("Router {} is down, dropping datagram to {}", self.node.address(), destination);
            return Ok(Verdict::Drop);
        }

        let option = datagram
            .option
            .as_mut()
            .ok_or(RoutingError::MissingOption(destination))?;
        let source = datagram.source;
        self.route(source, destination, option, now)
    }

    /// Datagram created on this node: attach a fresh option and route it
    pub fn on_local_originate(
        &mut self,
        datagram: &mut Datagram,
        now: Timestamp,
    ) -> Result<Verdict, RouterError> {
        let Some(destination) = self.routed_destination(datagram) else {
            return Ok(Verdict::Accept);
        };
        if !self.running {
            warn!("Router {} is down, dropping datagram to {}", self.node.address(), destination);
            return Ok(Verdict::Drop);
        }

        let destination_position = self
            .location
            .lookup(&destination)
            .ok_or(RoutingError::UnknownDestination(destination))?;
        let source = datagram.source;
        let option = datagram
            .option
            .insert(RoutingOption::new(destination_position));
        self.route(source, destination, option, now)
    }

    /// Unicast destination this router must route for, if any
    fn routed_destination(&self, datagram: &Datagram) -> Option<NodeId> {
        match datagram.destination {
            Destination::Unicast(node_id) if !self.node.is_local_address(&node_id) => Some(node_id),
            _ => None,
        }
    }

    fn route(
        &mut self,
        source: NodeId,
        destination: NodeId,
        option: &mut RoutingOption,
        now: Timestamp,
    ) -> Result<Verdict, RouterError> {
        let self_id = self.node.address();
        let self_position = self.node.position();
        let ctx = RoutingContext {
            self_id,
            self_position,
            neighbors: &self.neighbors,
            planarizer: Planarizer::new(
                self.config.planarization_mode,
                self_position,
                &self.neighbors,
            ),
            estimator: DelayEstimator::new(
                &self.config,
                self_position,
                &self.neighbors,
                &self.backlog,
                self.link.as_ref(),
                now,
            ),
        };

        match self.engine.find_next_hop(&ctx, destination, option)? {
            NextHop::Forward(next_hop) => {
                debug!(
                    "{} → {}: next hop {} ({})",
                    source, destination, next_hop, option.mode
                );
                option.sender_address = Some(self_id);
                Ok(Verdict::Forward {
                    next_hop,
                    interface: self.config.output_interface.clone(),
                })
            }
            NextHop::NoRoute(reason) => {
                warn!(
                    "No next hop at {} for {} → {} ({:?}), dropping",
                    self_id, source, destination, reason
                );
                Ok(Verdict::Drop)
            }
        }
    }

    // ------------------------------------------------------------------------
    // INSPECTION
    // ------------------------------------------------------------------------

    /// Planar neighbors counter-clockwise from `start_angle`
    pub fn planar_neighbors_counter_clockwise(&self, start_angle: f64) -> Vec<NodeId> {
        Planarizer::new(
            self.config.planarization_mode,
            self.node.position(),
            &self.neighbors,
        )
        .planar_neighbors_counter_clockwise(start_angle)
    }

    pub fn summary(&self) -> RoutingSummary {
        let planar_neighbors = Planarizer::new(
            self.config.planarization_mode,
            self.node.position(),
            &self.neighbors,
        )
        .planar_neighbors()
        .len();

        RoutingSummary {
            address: self.node.address(),
            running: self.running,
            neighbors: self.neighbors.len(),
            planar_neighbors,
            backlog_entries: self.backlog.len(),
            stats: self.engine.stats().clone(),
        }
    }
}
