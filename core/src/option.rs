//! Routing option carried inside every forwarded datagram
//!
//! The option travels hop by hop: each relay reads it, may flip its mode and
//! writes it back before forwarding. Perimeter fields only mean something in
//! perimeter mode and are reset on every mode switch.

use crate::config::ConfigError;
use crate::geometry::{NodeId, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forwarding mode, carried on the wire as a one-byte code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RoutingMode {
    Greedy,
    Perimeter,
}

impl RoutingMode {
    pub fn code(&self) -> u8 {
        match self {
            RoutingMode::Greedy => 0,
            RoutingMode::Perimeter => 1,
        }
    }
}

impl TryFrom<u8> for RoutingMode {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RoutingMode::Greedy),
            1 => Ok(RoutingMode::Perimeter),
            other => Err(ConfigError::UnknownRoutingMode(other)),
        }
    }
}

impl From<RoutingMode> for u8 {
    fn from(mode: RoutingMode) -> u8 {
        mode.code()
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Greedy => write!(f, "greedy"),
            RoutingMode::Perimeter => write!(f, "perimeter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingOption {
    pub mode: RoutingMode,
    /// Destination coordinates resolved at the origin
    pub destination_position: Position,
    /// Where the current perimeter episode started
    pub perimeter_start_position: Option<Position>,
    /// Last point where the walk crossed the start→destination line
    pub perimeter_forward_position: Option<Position>,
    /// First sender on the current face
    pub face_first_sender: Option<NodeId>,
    /// First receiver on the current face
    pub face_first_receiver: Option<NodeId>,
    /// Previous hop, stamped on every forward
    pub sender_address: Option<NodeId>,
}

impl RoutingOption {
    /// Fresh greedy option for a datagram headed to `destination_position`
    pub fn new(destination_position: Position) -> Self {
        Self {
            mode: RoutingMode::Greedy,
            destination_position,
            perimeter_start_position: None,
            perimeter_forward_position: None,
            face_first_sender: None,
            face_first_receiver: None,
            sender_address: None,
        }
    }

    /// Enter perimeter mode at a local minimum
    pub fn enter_perimeter(&mut self, self_id: NodeId, self_position: Position) {
        self.mode = RoutingMode::Perimeter;
        self.perimeter_start_position = Some(self_position);
        self.perimeter_forward_position = Some(self_position);
        self.face_first_sender = Some(self_id);
        self.face_first_receiver = None;
    }

    /// Resume greedy mode, dropping every perimeter marker
    pub fn enter_greedy(&mut self) {
        self.mode = RoutingMode::Greedy;
        self.perimeter_start_position = None;
        self.perimeter_forward_position = None;
        self.face_first_sender = None;
        self.face_first_receiver = None;
    }

    /// Bytes the option occupies inside a network header:
    /// type + length, mode, three positions and three addresses.
    pub fn encoded_length(address_byte_length: usize, position_byte_length: usize) -> usize {
        let type_and_length = 1 + 1;
        let routing_mode = 1;
        type_and_length + routing_mode + 3 * position_byte_length + 3 * address_byte_length
    }
}
