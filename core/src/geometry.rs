//! Planar geometry for position-based forwarding
//!
//! Positions are 3-component but every routing decision is planar: z is carried
//! through arithmetic and ignored by the bearing and intersection tests.
//! - Bearings grow clockwise in screen coordinates (y is negated)
//! - Segment intersections only count when strictly inside both segments

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Div, Sub};

/// A full turn in radians
pub const FULL_TURN: f64 = 2.0 * PI;

/// Network-layer identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl NodeId {
    /// On-wire size of an address (IPv4)
    pub const BYTE_LENGTH: usize = 4;
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

/// Last-known location of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Position on the ground plane
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean length of this position taken as a vector
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to another position
    pub fn distance(&self, other: &Position) -> f64 {
        (*other - *self).length()
    }

    /// Point halfway between two positions
    pub fn midpoint(&self, other: &Position) -> Position {
        (*self + *other) / 2.0
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Div<f64> for Position {
    type Output = Position;

    fn div(self, rhs: f64) -> Position {
        Position::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Bearing of a vector in `[0, 2π)`.
///
/// Computed as `atan2(-y, x)`, so angles increase clockwise when y grows
/// downwards. The zero vector has no direction and maps to `0.0`.
pub fn bearing(vector: Position) -> f64 {
    if vector.x == 0.0 && vector.y == 0.0 {
        return 0.0;
    }
    let angle = (-vector.y).atan2(vector.x);
    if angle >= 0.0 {
        return angle;
    }
    let wrapped = angle + FULL_TURN;
    // tiny negative angles round up to a full turn
    if wrapped >= FULL_TURN {
        0.0
    } else {
        wrapped
    }
}

/// Intersection of segments `[begin1, end1]` and `[begin2, end2]`.
///
/// Returns `None` when the segments share an endpoint, are parallel, or meet
/// anywhere but the open interior of both segments.
pub fn segment_intersection(
    begin1: Position,
    end1: Position,
    begin2: Position,
    end2: Position,
) -> Option<Position> {
    // shared vertices are unstable in floating point
    if begin1 == begin2 || begin1 == end2 || end1 == begin2 || end1 == end2 {
        return None;
    }

    let r = end1 - begin1;
    let s = end2 - begin2;
    let denominator = r.x * s.y - r.y * s.x;
    if denominator == 0.0 {
        return None;
    }

    let offset = begin2 - begin1;
    let t = (offset.x * s.y - offset.y * s.x) / denominator;
    let u = (offset.x * r.y - offset.y * r.x) / denominator;
    if t > 0.0 && t < 1.0 && u > 0.0 && u < 1.0 {
        Some(Position::planar(begin1.x + t * r.x, begin1.y + t * r.y))
    } else {
        None
    }
}
