// Geographic routing core
//
// Greedy forwarding on neighbor positions, perimeter fallback on a planar
// subgraph, and an optional delay-aware tie-break between equally close
// neighbors. Everything is synchronous and clock-free: callers pass `now`.

pub mod backlog;
pub mod beacon;
pub mod config;
pub mod delay;
pub mod directory;
pub mod engine;
pub mod geometry;
pub mod option;
pub mod packet;
pub mod planar;
pub mod router;

/// Time as supplied by the host, measured from an arbitrary epoch
pub type Timestamp = std::time::Duration;

pub use backlog::{BacklogEntry, BacklogReport, BacklogTracker, LinkLayer};
pub use beacon::Beacon;
pub use config::{ConfigError, RoutingConfig};
pub use delay::{DelayEstimate, DelayEstimator, QueueTerm};
pub use directory::{
    DirectoryEntry, DirectoryError, LocationService, PositionDirectory, SharedDirectory,
};
pub use engine::{
    NextHop, NoRouteReason, RoutingContext, RoutingEngine, RoutingError, RoutingStats,
};
pub use geometry::{bearing, segment_intersection, NodeId, Position};
pub use option::{RoutingMode, RoutingOption};
pub use packet::{Datagram, Destination, Verdict};
pub use planar::{PlanarizationMode, Planarizer};
pub use router::{
    BeaconTick, GeoRouter, LocalNode, RouterError, RouterTimer, RoutingSummary, StaticNode,
};
