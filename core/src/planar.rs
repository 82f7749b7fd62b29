//! Neighbor planarization for perimeter forwarding
//!
//! Perimeter forwarding walks faces of a planar graph, so crossing links must
//! be dropped from the neighbor set first. A neighbor N is dropped when some
//! other neighbor W witnesses that the link self→N is not needed:
//! - Gabriel Graph: W lies strictly inside the circle with diameter [self, N]
//! - Relative Neighborhood Graph: |self N| > max(|self W|, |N W|)
//!
//! The planar set is recomputed from the directory on every call.

use crate::config::ConfigError;
use crate::directory::PositionDirectory;
use crate::geometry::{bearing, NodeId, Position, FULL_TURN};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanarizationMode {
    /// Use every neighbor as is
    #[serde(rename = "", alias = "NONE")]
    None,
    #[default]
    #[serde(rename = "GG")]
    Gabriel,
    #[serde(rename = "RNG")]
    RelativeNeighborhood,
}

impl FromStr for PlanarizationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "NONE" => Ok(Self::None),
            "GG" => Ok(Self::Gabriel),
            "RNG" => Ok(Self::RelativeNeighborhood),
            other => Err(ConfigError::UnknownPlanarizationMode(other.to_string())),
        }
    }
}

impl fmt::Display for PlanarizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Gabriel => write!(f, "GG"),
            Self::RelativeNeighborhood => write!(f, "RNG"),
        }
    }
}

pub struct Planarizer<'a> {
    mode: PlanarizationMode,
    self_position: Position,
    neighbors: &'a PositionDirectory,
}

impl<'a> Planarizer<'a> {
    pub fn new(
        mode: PlanarizationMode,
        self_position: Position,
        neighbors: &'a PositionDirectory,
    ) -> Self {
        Self {
            mode,
            self_position,
            neighbors,
        }
    }

    /// Neighbors kept by the configured planar subgraph, in identity order
    pub fn planar_neighbors(&self) -> Vec<NodeId> {
        self.neighbors
            .iter()
            .filter(|candidate| !self.is_eliminated(candidate.node_id, candidate.position))
            .map(|candidate| candidate.node_id)
            .collect()
    }

    /// Planar neighbors sorted by bearing, counter-clockwise from `start_angle`.
    ///
    /// A neighbor lying exactly at `start_angle` sorts last, so the link the
    /// packet arrived on is only reused when nothing else is left.
    pub fn planar_neighbors_counter_clockwise(&self, start_angle: f64) -> Vec<NodeId> {
        let mut ordered: Vec<(NodeId, f64)> = self
            .planar_neighbors()
            .into_iter()
            .filter_map(|node_id| {
                let position = self.neighbors.get(&node_id).ok()?;
                let mut angle = bearing(position - self.self_position) - start_angle;
                if angle <= 0.0 {
                    angle += FULL_TURN;
                }
                Some((node_id, angle))
            })
            .collect();

        ordered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        ordered.into_iter().map(|(node_id, _)| node_id).collect()
    }

    fn is_eliminated(&self, candidate: NodeId, candidate_position: Position) -> bool {
        let mut witnesses = self
            .neighbors
            .iter()
            .filter(|witness| witness.node_id != candidate);

        match self.mode {
            PlanarizationMode::None => false,
            PlanarizationMode::RelativeNeighborhood => {
                let candidate_distance = self.self_position.distance(&candidate_position);
                witnesses.any(|witness| {
                    let witness_distance = self.self_position.distance(&witness.position);
                    let candidate_witness_distance = candidate_position.distance(&witness.position);
                    candidate_distance > witness_distance.max(candidate_witness_distance)
                })
            }
            PlanarizationMode::Gabriel => {
                let middle = self.self_position.midpoint(&candidate_position);
                let radius = candidate_position.distance(&middle);
                witnesses.any(|witness| witness.position.distance(&middle) < radius)
            }
        }
    }
}
