// Discrete-event host for a set of routers
//
// Plays the scheduler, the radio and the network layer around the routing
// core: beacon and purge timers, delivery of beacons within radio range, and
// hop-by-hop forwarding of injected flows.

use crate::scenario::Scenario;
use anyhow::{Context, Result};
use qgpsr_core::{
    Beacon, Datagram, GeoRouter, LinkLayer, NodeId, Position, RouterError, RoutingConfig,
    SharedDirectory, StaticNode, Timestamp, Verdict,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Relays a flow may visit before it is abandoned
pub const HOP_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Event {
    Beacon(NodeId),
    Purge(NodeId),
    Flow(usize),
}

/// Link layer backed by the scenario's synthetic queues and bitrates
struct SimLink {
    queued_bytes: u64,
    bitrates: Arc<BTreeMap<NodeId, f64>>,
}

impl LinkLayer for SimLink {
    fn local_backlog_bytes(&self) -> u64 {
        self.queued_bytes
    }

    fn neighbor_bitrate(&self, node_id: &NodeId) -> Option<f64> {
        self.bitrates.get(node_id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FlowOutcome {
    Delivered,
    NoRoute,
    HopLimit,
    Failed(String),
}

/// Control bytes put on the air during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overhead {
    /// Beacons sent, one chunk each
    pub beacon_bytes: u64,
    /// Routing options carried, one per hop
    pub option_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub at: Duration,
    pub source: NodeId,
    pub destination: NodeId,
    pub path: Vec<NodeId>,
    pub outcome: FlowOutcome,
}

pub struct Simulation {
    scenario: Scenario,
    routers: BTreeMap<NodeId, GeoRouter>,
    positions: BTreeMap<NodeId, Position>,
    queue: BinaryHeap<Reverse<(Timestamp, u64, Event)>>,
    /// Instant each node's purge timer is armed for
    purge_armed: BTreeMap<NodeId, Timestamp>,
    sequence: u64,
    rng: StdRng,
    reports: Vec<FlowReport>,
    overhead: Overhead,
}

impl Simulation {
    /// Build one router per node, start them all at 0 s and queue the flows
    pub fn new(scenario: Scenario, config: RoutingConfig, seed: u64) -> Result<Self> {
        let registry = SharedDirectory::new();
        let bitrates: Arc<BTreeMap<NodeId, f64>> = Arc::new(
            scenario
                .nodes
                .iter()
                .map(|node| (node.id, node.bitrate_bps))
                .collect(),
        );

        let mut sim = Self {
            scenario: scenario.clone(),
            routers: BTreeMap::new(),
            positions: BTreeMap::new(),
            queue: BinaryHeap::new(),
            purge_armed: BTreeMap::new(),
            sequence: 0,
            rng: StdRng::seed_from_u64(seed),
            reports: Vec::new(),
            overhead: Overhead::default(),
        };

        for node in &scenario.nodes {
            let link = SimLink {
                queued_bytes: node.backlog_bytes,
                bitrates: bitrates.clone(),
            };
            let mut router = GeoRouter::new(
                config.clone(),
                Arc::new(StaticNode::new(node.id, node.position())),
                Arc::new(link),
                Arc::new(registry.clone()),
            )
            .with_context(|| format!("Failed to create router for {}", node.id))?;

            let first_beacon = router.start(Duration::ZERO, &mut sim.rng)?;
            sim.schedule(first_beacon, Event::Beacon(node.id));
            sim.routers.insert(node.id, router);
            sim.positions.insert(node.id, node.position());
        }

        for (index, flow) in scenario.flows.iter().enumerate() {
            let at = Duration::try_from_secs_f64(flow.at).with_context(|| {
                format!("Flow {} → {} has an invalid start time", flow.source, flow.destination)
            })?;
            sim.schedule(at, Event::Flow(index));
        }

        info!(
            "Simulation ready: {} nodes, {} flows, range {} m",
            scenario.nodes.len(),
            scenario.flows.len(),
            scenario.radio_range
        );
        Ok(sim)
    }

    pub fn routers(&self) -> &BTreeMap<NodeId, GeoRouter> {
        &self.routers
    }

    pub fn reports(&self) -> &[FlowReport] {
        &self.reports
    }

    pub fn overhead(&self) -> Overhead {
        self.overhead
    }

    fn schedule(&mut self, at: Timestamp, event: Event) {
        self.sequence += 1;
        self.queue.push(Reverse((at, self.sequence, event)));
    }

    /// Process every event up to and including `until`
    pub fn run(&mut self, until: Duration) {
        while let Some(Reverse((at, _, event))) = self.queue.pop() {
            if at > until {
                break;
            }
            match event {
                Event::Beacon(node_id) => self.beacon_timer(node_id, at),
                Event::Purge(node_id) => self.purge_timer(node_id, at),
                Event::Flow(index) => self.inject_flow(index, at),
            }
        }
    }

    /// One round of beacons from every node, outside the timer schedule
    pub fn exchange_beacons(&mut self, now: Timestamp) {
        let beacons: Vec<Beacon> = self
            .routers
            .values()
            .map(|router| router.create_beacon())
            .collect();
        for beacon in &beacons {
            self.broadcast(beacon, now);
        }
    }

    fn beacon_timer(&mut self, node_id: NodeId, now: Timestamp) {
        let Some(router) = self.routers.get_mut(&node_id) else {
            return;
        };
        let tick = router.on_beacon_timer(now, &mut self.rng);
        self.schedule(now + tick.next_beacon_in, Event::Beacon(node_id));
        self.arm_purge(node_id, tick.purge_at);
        self.broadcast(&tick.beacon, now);
    }

    fn broadcast(&mut self, beacon: &Beacon, now: Timestamp) {
        if let Some(sender) = self.routers.get(&beacon.address) {
            self.overhead.beacon_bytes += sender.beacon_length() as u64;
        }
        let range = self.scenario.radio_range;
        let receivers: Vec<NodeId> = self
            .positions
            .iter()
            .filter(|(id, position)| {
                **id != beacon.address && position.distance(&beacon.position) <= range
            })
            .map(|(id, _)| *id)
            .collect();

        for receiver in receivers {
            if let Some(router) = self.routers.get_mut(&receiver) {
                let purge_at = router.on_beacon_received(beacon, now);
                self.arm_purge(receiver, purge_at);
            }
        }
    }

    fn arm_purge(&mut self, node_id: NodeId, purge_at: Option<Timestamp>) {
        match purge_at {
            Some(at) if self.purge_armed.get(&node_id) != Some(&at) => {
                self.purge_armed.insert(node_id, at);
                self.schedule(at, Event::Purge(node_id));
            }
            Some(_) => {}
            None => {
                self.purge_armed.remove(&node_id);
            }
        }
    }

    fn purge_timer(&mut self, node_id: NodeId, now: Timestamp) {
        // superseded by a later re-arm
        if self.purge_armed.get(&node_id) != Some(&now) {
            return;
        }
        self.purge_armed.remove(&node_id);
        if let Some(router) = self.routers.get_mut(&node_id) {
            let next = router.on_purge_timer(now);
            self.arm_purge(node_id, next);
        }
    }

    fn inject_flow(&mut self, index: usize, now: Timestamp) {
        let Some(flow) = self.scenario.flows.get(index).cloned() else {
            return;
        };
        let (path, outcome) = self.route(flow.source, flow.destination, flow.bytes, now);
        debug!(
            "Flow {} → {} at {:?}: {:?} via {:?}",
            flow.source, flow.destination, now, outcome, path
        );
        self.reports.push(FlowReport {
            at: now,
            source: flow.source,
            destination: flow.destination,
            path,
            outcome,
        });
    }

    /// Carry one datagram hop by hop until it lands, drops or runs out of hops
    fn route(
        &mut self,
        source: NodeId,
        destination: NodeId,
        bytes: usize,
        now: Timestamp,
    ) -> (Vec<NodeId>, FlowOutcome) {
        let mut datagram = Datagram::unicast(source, destination, bytes);
        let mut current = source;
        let mut path = vec![source];

        for hop in 0..HOP_LIMIT {
            if current == destination {
                return (path, FlowOutcome::Delivered);
            }
            let Some(router) = self.routers.get_mut(&current) else {
                return (path, FlowOutcome::Failed(format!("no router at {}", current)));
            };
            let verdict: Result<Verdict, RouterError> = if hop == 0 {
                router.on_local_originate(&mut datagram, now)
            } else {
                router.on_forward(&mut datagram, now)
            };
            let option_length = router.option_length() as u64;
            match verdict {
                Ok(Verdict::Forward { next_hop, .. }) => {
                    self.overhead.option_bytes += option_length;
                    datagram = match transmit(&datagram) {
                        Ok(received) => received,
                        Err(e) => return (path, FlowOutcome::Failed(e.to_string())),
                    };
                    current = next_hop;
                    path.push(current);
                }
                Ok(Verdict::Accept) => return (path, FlowOutcome::Delivered),
                Ok(Verdict::Drop) => return (path, FlowOutcome::NoRoute),
                Err(e) => return (path, FlowOutcome::Failed(e.to_string())),
            }
        }

        if current == destination {
            (path, FlowOutcome::Delivered)
        } else {
            (path, FlowOutcome::HopLimit)
        }
    }
}

/// Put a datagram on the air and read it back at the next hop
fn transmit(datagram: &Datagram) -> Result<Datagram> {
    let frame = serde_json::to_vec(datagram).context("Failed to encode datagram")?;
    serde_json::from_slice(&frame).context("Failed to decode datagram at the next hop")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{FlowSpec, NodeSpec};

    fn node(id: u32, x: f64, y: f64) -> NodeSpec {
        NodeSpec {
            id: NodeId(id),
            x,
            y,
            bitrate_bps: 1_000_000.0,
            backlog_bytes: 0,
        }
    }

    fn flow(at: f64, source: u32, destination: u32) -> FlowSpec {
        FlowSpec {
            at,
            source: NodeId(source),
            destination: NodeId(destination),
            bytes: 512,
        }
    }

    fn fast_beacons() -> RoutingConfig {
        RoutingConfig {
            beacon_interval_secs: 1.0,
            max_jitter_secs: 0.5,
            neighbor_validity_secs: 4.5,
            ..RoutingConfig::default()
        }
    }

    #[test]
    fn test_flow_delivered_after_beacons() {
        let scenario = Scenario {
            radio_range: 12.0,
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0), node(3, 20.0, 0.0)],
            flows: vec![flow(5.0, 1, 3)],
        };
        let mut sim = Simulation::new(scenario, fast_beacons(), 42).unwrap();

        sim.run(Duration::from_secs(6));

        let report = &sim.reports()[0];
        assert_eq!(report.outcome, FlowOutcome::Delivered);
        assert_eq!(report.path, vec![NodeId(1), NodeId(2), NodeId(3)]);

        // two hops, 39 option bytes each with the default 8-byte positions
        let overhead = sim.overhead();
        assert_eq!(overhead.option_bytes, 2 * 39);
        assert!(overhead.beacon_bytes > 0);
        assert_eq!(overhead.beacon_bytes % 16, 0);
    }

    #[test]
    fn test_flow_before_any_beacon_has_no_route() {
        // the destination registers itself on start, but no neighbor is known yet
        let scenario = Scenario {
            radio_range: 12.0,
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0)],
            flows: vec![flow(0.0, 1, 2)],
        };
        let mut sim = Simulation::new(scenario, fast_beacons(), 1).unwrap();

        sim.run(Duration::from_secs(1));

        assert_eq!(sim.reports()[0].outcome, FlowOutcome::NoRoute);
    }

    #[test]
    fn test_neighbors_stay_fresh_while_beaconing() {
        let scenario = Scenario {
            radio_range: 12.0,
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0), node(3, 50.0, 0.0)],
            flows: vec![],
        };
        let mut sim = Simulation::new(scenario, fast_beacons(), 9).unwrap();

        sim.run(Duration::from_secs(30));

        let router = &sim.routers()[&NodeId(1)];
        assert_eq!(router.neighbors().all_ids(), vec![NodeId(2)]);
        assert!(sim.routers()[&NodeId(3)].neighbors().is_empty());
    }

    #[test]
    fn test_unrepresentable_flow_time_is_an_error() {
        let scenario = Scenario {
            radio_range: 12.0,
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0)],
            flows: vec![flow(1e20, 1, 2)],
        };
        let err = Simulation::new(scenario, fast_beacons(), 1).err().unwrap();
        assert!(err.to_string().contains("invalid start time"));
    }

    #[test]
    fn test_exchange_beacons_fills_directories() {
        let scenario = Scenario {
            radio_range: 12.0,
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0), node(3, 0.0, 10.0)],
            flows: vec![],
        };
        let mut sim = Simulation::new(scenario, RoutingConfig::default(), 3).unwrap();

        sim.exchange_beacons(Duration::ZERO);

        assert_eq!(sim.routers()[&NodeId(1)].neighbors().len(), 2);
        assert_eq!(sim.overhead().beacon_bytes, 3 * 16);
        // 2 and 3 are 14.1 m apart
        assert_eq!(sim.routers()[&NodeId(2)].neighbors().all_ids(), vec![NodeId(1)]);
    }
}
