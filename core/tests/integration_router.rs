// Integration tests for router lifecycle and soft state
//
// Timers are driven by hand: every call passes `now`, every returned timer
// is checked for the instant the router asked for.

use qgpsr_core::{
    Beacon, Datagram, GeoRouter, LinkLayer, LocationService, NodeId, Position, RouterTimer,
    RoutingConfig, RoutingMode, SharedDirectory, StaticNode, Verdict,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct IdleLink;

impl LinkLayer for IdleLink {
    fn local_backlog_bytes(&self) -> u64 {
        0
    }

    fn neighbor_bitrate(&self, _node_id: &NodeId) -> Option<f64> {
        None
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn router(id: u32, position: Position, registry: &SharedDirectory) -> (GeoRouter, Arc<StaticNode>) {
    let node = Arc::new(StaticNode::new(NodeId(id), position));
    let router = GeoRouter::new(
        RoutingConfig::default(),
        node.clone(),
        Arc::new(IdleLink),
        Arc::new(registry.clone()),
    )
    .unwrap();
    (router, node)
}

#[test]
fn test_neighbor_expires_without_beacons() {
    let registry = SharedDirectory::new();
    let (mut router, _) = router(1, Position::ZERO, &registry);
    router.start(secs(0), &mut StdRng::seed_from_u64(1)).unwrap();

    let neighbor = Beacon::new(NodeId(2), Position::planar(10.0, 0.0));
    assert_eq!(router.on_beacon_received(&neighbor, secs(1)), Some(secs(46)));
    // a refresh pushes the expiry back
    assert_eq!(router.on_beacon_received(&neighbor, secs(11)), Some(secs(56)));
    assert_eq!(router.on_purge_timer(secs(46)), Some(secs(56)));
    assert_eq!(router.neighbors().len(), 1);

    assert_eq!(router.on_purge_timer(secs(57)), None);
    assert!(router.neighbors().is_empty());
    // the directory service still knows the last position
    assert_eq!(registry.lookup(&NodeId(2)), Some(Position::planar(10.0, 0.0)));
}

#[test]
fn test_routes_follow_expiry() {
    let registry = SharedDirectory::new();
    registry.store(NodeId(9), Position::planar(100.0, 0.0), secs(0));
    let (mut router, _) = router(1, Position::ZERO, &registry);
    router.start(secs(0), &mut StdRng::seed_from_u64(1)).unwrap();

    router.on_beacon_received(&Beacon::new(NodeId(2), Position::planar(10.0, 0.0)), secs(1));
    router.on_beacon_received(&Beacon::new(NodeId(3), Position::planar(8.0, 0.0)), secs(30));

    let mut datagram = Datagram::unicast(NodeId(1), NodeId(9), 256);
    let verdict = router.on_local_originate(&mut datagram, secs(31)).unwrap();
    assert_eq!(verdict.next_hop(), Some(NodeId(2)));

    // node 2 goes silent and expires; node 3 is the best left
    router.on_purge_timer(secs(47));
    let mut datagram = Datagram::unicast(NodeId(1), NodeId(9), 256);
    let verdict = router.on_local_originate(&mut datagram, secs(47)).unwrap();
    assert_eq!(verdict.next_hop(), Some(NodeId(3)));
}

#[test]
fn test_forwarded_option_keeps_perimeter_state() {
    let registry = SharedDirectory::new();
    registry.store(NodeId(9), Position::planar(50.0, 0.0), secs(0));
    let (mut source, _) = router(1, Position::ZERO, &registry);
    let (mut relay, _) = router(2, Position::planar(-5.0, 5.0), &registry);
    let mut rng = StdRng::seed_from_u64(4);
    source.start(secs(0), &mut rng).unwrap();
    relay.start(secs(0), &mut rng).unwrap();

    source.on_beacon_received(&relay.create_beacon(), secs(1));
    relay.on_beacon_received(&source.create_beacon(), secs(1));

    let mut datagram = Datagram::unicast(NodeId(1), NodeId(9), 256);
    let verdict = source.on_local_originate(&mut datagram, secs(2)).unwrap();
    assert_eq!(verdict.next_hop(), Some(NodeId(2)));

    let option = datagram.option.clone().unwrap();
    assert_eq!(option.mode, RoutingMode::Perimeter);
    assert_eq!(option.perimeter_start_position, Some(Position::ZERO));
    assert_eq!(option.sender_address, Some(NodeId(1)));

    // the relay hands it back and stamps itself as sender
    let verdict = relay.on_forward(&mut datagram, secs(2)).unwrap();
    assert_eq!(verdict.next_hop(), Some(NodeId(1)));
    assert_eq!(datagram.option.as_ref().unwrap().sender_address, Some(NodeId(2)));

    // back at the source the face is closed
    assert_eq!(source.on_forward(&mut datagram, secs(2)).unwrap(), Verdict::Drop);
}

#[test]
fn test_crash_and_restart_relearns_from_beacons() {
    let registry = SharedDirectory::new();
    let (mut router, node) = router(1, Position::ZERO, &registry);
    let mut rng = StdRng::seed_from_u64(8);
    router.start(secs(0), &mut rng).unwrap();
    router.on_beacon_received(&Beacon::new(NodeId(2), Position::planar(10.0, 0.0)), secs(1));

    assert_eq!(
        router.crash(),
        vec![RouterTimer::Beacon, RouterTimer::PurgeNeighbors]
    );
    assert!(router.neighbors().is_empty());

    node.move_to(Position::planar(3.0, 3.0));
    router.start(secs(20), &mut rng).unwrap();
    assert_eq!(registry.lookup(&NodeId(1)), Some(Position::planar(3.0, 3.0)));

    router.on_beacon_received(&Beacon::new(NodeId(2), Position::planar(10.0, 0.0)), secs(21));
    assert_eq!(router.neighbors().len(), 1);
    assert_eq!(router.summary().neighbors, 1);
}

#[test]
fn test_beacon_timer_rearms_both_timers() {
    let registry = SharedDirectory::new();
    let (mut router, _) = router(1, Position::ZERO, &registry);
    let mut rng = StdRng::seed_from_u64(2);
    router.start(secs(0), &mut rng).unwrap();
    router.on_beacon_received(&Beacon::new(NodeId(2), Position::planar(10.0, 0.0)), secs(3));

    let tick = router.on_beacon_timer(secs(10), &mut rng);

    assert_eq!(tick.beacon.address, NodeId(1));
    assert_eq!(tick.beacon.tx_backlog_bytes, None);
    assert!(tick.next_beacon_in >= secs(5) && tick.next_beacon_in <= secs(15));
    assert_eq!(tick.purge_at, Some(secs(48)));
}

#[test]
fn test_config_from_json() {
    let config = RoutingConfig::from_json(
        r#"{
            "planarization_mode": "RNG",
            "beacon_interval_secs": 1.0,
            "max_jitter_secs": 0.5,
            "neighbor_validity_secs": 4.5,
            "enable_delay_tiebreaker": true,
            "enable_queue_delay": true
        }"#,
    )
    .unwrap();

    assert_eq!(config.max_backlog_age(), secs(3));
    assert_eq!(config.neighbor_validity(), Duration::from_millis(4_500));
    assert_eq!(config.distance_equality_threshold, 1.0);
}

#[test]
fn test_location_service_shared_across_threads() {
    let registry = SharedDirectory::new();
    let handles: Vec<_> = (0..4u32)
        .map(|id| {
            let registry = registry.clone();
            thread::spawn(move || {
                registry.store(NodeId(id), Position::planar(id as f64, 0.0), secs(0));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), 4);
    assert_eq!(registry.lookup(&NodeId(3)), Some(Position::planar(3.0, 0.0)));
}
