//! Next-hop decision engine: greedy forwarding with perimeter fallback
//!
//! Decision algorithm for every datagram, driven by the mode in its option:
//! 1. **Perimeter, progress resumed**: this node is closer to the destination
//!    than where the perimeter episode began, so drop back to greedy
//! 2. **Greedy**: forward to the neighbor closest to the destination; with the
//!    delay tie-break on, neighbors within the tie window of the current best
//!    compete on estimated delay instead
//! 3. **Local minimum**: no neighbor improves on our own distance, so enter
//!    perimeter mode here and walk the planar face with the right-hand rule
//! 4. **No route**: the face walk found no usable edge or came back to the
//!    first edge of its face
//!
//! Greedy candidates are scanned by ascending distance to the destination,
//! then by identity. The closest neighbor is therefore always adopted first
//! and every tie is settled by delay alone, whatever order beacons arrived in.

use crate::delay::DelayEstimator;
use crate::directory::{DirectoryError, PositionDirectory};
use crate::geometry::{bearing, segment_intersection, NodeId, Position};
use crate::option::{RoutingMode, RoutingOption};
use crate::planar::Planarizer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Routing option missing from datagram to {0}")]
    MissingOption(NodeId),

    #[error("Perimeter option to {0} has no start position")]
    MalformedOption(NodeId),

    #[error("No position known for destination {0}")]
    UnknownDestination(NodeId),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Why no neighbor was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoRouteReason {
    /// Every planar neighbor crossed the start→destination line
    FaceExhausted,
    /// The walk returned to the first edge of its face
    PerimeterClosed,
}

/// Outcome of one next-hop decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    Forward(NodeId),
    NoRoute(NoRouteReason),
}

impl NextHop {
    pub fn neighbor(&self) -> Option<NodeId> {
        match self {
            NextHop::Forward(node_id) => Some(*node_id),
            NextHop::NoRoute(_) => None,
        }
    }
}

/// Counters kept across decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Greedy decisions that found a strictly closer neighbor
    pub greedy_selections: u64,
    /// Ties settled in favor of a lower-delay neighbor
    pub tiebreaker_activations: u64,
    /// Greedy → perimeter switches
    pub perimeter_entries: u64,
    /// Perimeter → greedy switches
    pub greedy_resumptions: u64,
    /// Face changes while walking the perimeter
    pub face_changes: u64,
    /// Decisions that ended without a next hop
    pub no_route: u64,
}

impl RoutingStats {
    /// Share of greedy selections overridden by the delay tie-break
    pub fn tiebreaker_ratio(&self) -> Option<f64> {
        if self.greedy_selections == 0 {
            None
        } else {
            Some(self.tiebreaker_activations as f64 / self.greedy_selections as f64)
        }
    }
}

/// Everything a decision may read about the local node at one instant
pub struct RoutingContext<'a> {
    pub self_id: NodeId,
    pub self_position: Position,
    pub neighbors: &'a PositionDirectory,
    pub planarizer: Planarizer<'a>,
    pub estimator: DelayEstimator<'a>,
}

pub struct RoutingEngine {
    enable_delay_tiebreaker: bool,
    distance_equality_threshold: f64,
    stats: RoutingStats,
}

impl RoutingEngine {
    pub fn new(enable_delay_tiebreaker: bool, distance_equality_threshold: f64) -> Self {
        Self {
            enable_delay_tiebreaker,
            distance_equality_threshold,
            stats: RoutingStats::default(),
        }
    }

    pub fn stats(&self) -> &RoutingStats {
        &self.stats
    }

    /// Pick the next hop toward `destination`, updating `option` in place.
    ///
    /// A call switches mode at most twice (perimeter → greedy → perimeter):
    /// perimeter mode entered from greedy starts at this node and so can
    /// never resume greedy within the same call.
    pub fn find_next_hop(
        &mut self,
        ctx: &RoutingContext<'_>,
        destination: NodeId,
        option: &mut RoutingOption,
    ) -> Result<NextHop, RoutingError> {
        match option.mode {
            RoutingMode::Perimeter => {
                let start = option
                    .perimeter_start_position
                    .ok_or(RoutingError::MalformedOption(destination))?;
                let self_distance = ctx.self_position.distance(&option.destination_position);
                let start_distance = start.distance(&option.destination_position);
                if self_distance >= start_distance {
                    return self.walk_face(ctx, destination, option);
                }
                debug!(
                    "Resuming greedy routing to {} ({:.2} m < {:.2} m)",
                    destination, self_distance, start_distance
                );
                option.enter_greedy();
                self.stats.greedy_resumptions += 1;
            }
            RoutingMode::Greedy => {}
        }

        if let Some(next_hop) = self.select_greedy(ctx, destination, option)? {
            return Ok(NextHop::Forward(next_hop));
        }

        debug!("Local minimum toward {}, switching to perimeter routing", destination);
        option.enter_perimeter(ctx.self_id, ctx.self_position);
        self.stats.perimeter_entries += 1;
        self.walk_face(ctx, destination, option)
    }

    /// Closest neighbor strictly nearer to the destination than this node
    fn select_greedy(
        &mut self,
        ctx: &RoutingContext<'_>,
        destination: NodeId,
        option: &RoutingOption,
    ) -> Result<Option<NodeId>, RoutingError> {
        let target = option.destination_position;
        let self_distance = ctx.self_position.distance(&target);

        let mut candidates: Vec<(NodeId, f64)> = ctx
            .neighbors
            .iter()
            .map(|entry| (entry.node_id, entry.position.distance(&target)))
            .collect();
        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut best_distance = self_distance;
        let mut best_neighbor: Option<NodeId> = None;
        let mut best_delay = f64::INFINITY;

        for (neighbor, distance) in candidates {
            if distance < best_distance {
                best_distance = distance;
                best_neighbor = Some(neighbor);
                if self.enable_delay_tiebreaker {
                    best_delay = ctx.estimator.estimate(&neighbor)?;
                }
                self.stats.greedy_selections += 1;
            } else if self.enable_delay_tiebreaker
                && best_neighbor.is_some()
                && (distance - best_distance).abs() < self.distance_equality_threshold
                && distance < self_distance
            {
                let delay = ctx.estimator.estimate(&neighbor)?;
                if delay < best_delay {
                    debug!(
                        "Tie-break toward {}: {} ({:.6} s) replaces {:?} ({:.6} s)",
                        destination, neighbor, delay, best_neighbor, best_delay
                    );
                    best_distance = distance;
                    best_neighbor = Some(neighbor);
                    best_delay = delay;
                    self.stats.tiebreaker_activations += 1;
                }
            }
        }

        Ok(best_neighbor)
    }

    /// Right-hand-rule step along the current face
    fn walk_face(
        &mut self,
        ctx: &RoutingContext<'_>,
        destination: NodeId,
        option: &mut RoutingOption,
    ) -> Result<NextHop, RoutingError> {
        let start = option
            .perimeter_start_position
            .ok_or(RoutingError::MalformedOption(destination))?;
        let target = option.destination_position;

        // the arrival link if we still know where the sender is, else the destination
        let reference_bearing = match option
            .sender_address
            .and_then(|sender| ctx.neighbors.get(&sender).ok())
        {
            Some(sender_position) => bearing(sender_position - ctx.self_position),
            None => bearing(target - ctx.self_position),
        };

        let mut selected = None;
        for candidate in ctx.planarizer.planar_neighbors_counter_clockwise(reference_bearing) {
            let candidate_position = ctx.neighbors.get(&candidate)?;
            match segment_intersection(start, target, ctx.self_position, candidate_position) {
                None => {
                    selected = Some(candidate);
                    break;
                }
                Some(crossing) => {
                    debug!("Edge to {} crosses the line to {} at {}, changing face", candidate, destination, crossing);
                    option.face_first_sender = Some(ctx.self_id);
                    option.face_first_receiver = None;
                    option.perimeter_forward_position = Some(crossing);
                    self.stats.face_changes += 1;
                }
            }
        }

        let Some(selected) = selected else {
            self.stats.no_route += 1;
            return Ok(NextHop::NoRoute(NoRouteReason::FaceExhausted));
        };

        if option.face_first_sender == Some(ctx.self_id) && option.face_first_receiver == Some(selected) {
            debug!("Perimeter toward {} closed on its first edge", destination);
            self.stats.no_route += 1;
            return Ok(NextHop::NoRoute(NoRouteReason::PerimeterClosed));
        }

        if option.face_first_receiver.is_none() {
            option.face_first_receiver = Some(selected);
        }
        Ok(NextHop::Forward(selected))
    }
}
