//! Datagram view seen by the routing hooks
//!
//! Only the fields routing reads or writes are modeled. Splicing the option
//! into a concrete network header is left to the caller.

use crate::geometry::NodeId;
use crate::option::RoutingOption;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Unicast(NodeId),
    Multicast,
    Broadcast,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Unicast(node_id) => write!(f, "{}", node_id),
            Destination::Multicast => write!(f, "multicast"),
            Destination::Broadcast => write!(f, "broadcast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datagram {
    pub source: NodeId,
    pub destination: Destination,
    pub byte_length: usize,
    /// Routing option spliced into the network header, if any
    pub option: Option<RoutingOption>,
}

impl Datagram {
    pub fn unicast(source: NodeId, destination: NodeId, byte_length: usize) -> Self {
        Self {
            source,
            destination: Destination::Unicast(destination),
            byte_length,
            option: None,
        }
    }
}

/// What the network layer should do with a datagram after a hook ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver or forward untouched
    Accept,
    /// Send to `next_hop` through `interface`
    Forward { next_hop: NodeId, interface: String },
    /// Discard
    Drop,
}

impl Verdict {
    pub fn next_hop(&self) -> Option<NodeId> {
        match self {
            Verdict::Forward { next_hop, .. } => Some(*next_hop),
            _ => None,
        }
    }
}
