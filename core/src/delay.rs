//! Per-neighbor forwarding delay estimate
//!
//! delay = distance × per-meter factor, plus (when congestion awareness is on
//! and the neighbor's backlog report is fresh) backlog bits / neighbor bitrate.
//! A report is fresh while its age is at most three beacon intervals.

use crate::backlog::{BacklogTracker, LinkLayer};
use crate::config::RoutingConfig;
use crate::directory::{DirectoryError, PositionDirectory};
use crate::geometry::{NodeId, Position};
use crate::Timestamp;

/// Components of a delay estimate, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelayEstimate {
    pub propagation: f64,
    pub queueing: f64,
}

impl DelayEstimate {
    pub fn total(&self) -> f64 {
        self.propagation + self.queueing
    }
}

/// Why the queueing term of an estimate is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTerm {
    Applied,
    Disabled,
    NoReport,
    Stale,
    UnknownBitrate,
}

/// Read-only view over a router's state at one instant
pub struct DelayEstimator<'a> {
    config: &'a RoutingConfig,
    self_position: Position,
    neighbors: &'a PositionDirectory,
    backlog: &'a BacklogTracker,
    link: &'a dyn LinkLayer,
    now: Timestamp,
}

impl<'a> DelayEstimator<'a> {
    pub fn new(
        config: &'a RoutingConfig,
        self_position: Position,
        neighbors: &'a PositionDirectory,
        backlog: &'a BacklogTracker,
        link: &'a dyn LinkLayer,
        now: Timestamp,
    ) -> Self {
        Self {
            config,
            self_position,
            neighbors,
            backlog,
            link,
            now,
        }
    }

    /// Estimated delay through `neighbor` in seconds
    pub fn estimate(&self, neighbor: &NodeId) -> Result<f64, DirectoryError> {
        Ok(self.breakdown(neighbor)?.0.total())
    }

    /// Estimate split into its terms, with the fate of the queueing term
    pub fn breakdown(&self, neighbor: &NodeId) -> Result<(DelayEstimate, QueueTerm), DirectoryError> {
        let neighbor_position = self.neighbors.get(neighbor)?;
        let distance = self.self_position.distance(&neighbor_position);
        let mut estimate = DelayEstimate {
            propagation: distance * self.config.delay_estimation_factor,
            queueing: 0.0,
        };

        if !self.config.enable_queue_delay {
            return Ok((estimate, QueueTerm::Disabled));
        }

        let Some(report) = self.backlog.lookup(neighbor, self.now) else {
            return Ok((estimate, QueueTerm::NoReport));
        };

        // a stale hint is ignored outright, never zero-filled
        if report.age > self.config.max_backlog_age() {
            return Ok((estimate, QueueTerm::Stale));
        }

        match self.link.neighbor_bitrate(neighbor) {
            Some(bitrate) if bitrate > 0.0 => {
                estimate.queueing = f64::from(report.bytes) * 8.0 / bitrate;
                Ok((estimate, QueueTerm::Applied))
            }
            _ => Ok((estimate, QueueTerm::UnknownBitrate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::MockLinkLayer;
    use std::time::Duration;

    const EPS: f64 = 1e-12;

    fn queue_aware_config() -> RoutingConfig {
        RoutingConfig {
            enable_queue_delay: true,
            delay_estimation_factor: 0.001,
            beacon_interval_secs: 1.0,
            max_jitter_secs: 0.5,
            ..RoutingConfig::default()
        }
    }

    fn neighbors() -> PositionDirectory {
        let mut directory = PositionDirectory::new();
        directory.set(NodeId(2), Position::planar(100.0, 0.0), Duration::ZERO);
        directory
    }

    fn link_with_bitrate(bitrate: Option<f64>) -> MockLinkLayer {
        let mut link = MockLinkLayer::new();
        link.expect_neighbor_bitrate().return_const(bitrate);
        link
    }

    #[test]
    fn test_distance_only_when_disabled() {
        let config = RoutingConfig {
            enable_queue_delay: false,
            ..queue_aware_config()
        };
        let neighbors = neighbors();
        let mut backlog = BacklogTracker::new();
        backlog.record(NodeId(2), 10_000, Duration::ZERO);
        let mut link = MockLinkLayer::new();
        link.expect_neighbor_bitrate().never();

        let estimator = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            Duration::ZERO,
        );
        let (estimate, term) = estimator.breakdown(&NodeId(2)).unwrap();

        assert!((estimate.total() - 0.1).abs() < EPS);
        assert_eq!(term, QueueTerm::Disabled);
    }

    #[test]
    fn test_fresh_backlog_adds_queueing_delay() {
        let config = queue_aware_config();
        let neighbors = neighbors();
        let mut backlog = BacklogTracker::new();
        backlog.record(NodeId(2), 125_000, Duration::from_secs(1));
        let link = link_with_bitrate(Some(1_000_000.0));

        let estimator = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            Duration::from_secs(2),
        );

        // 0.1 s propagation + 1 Mbit / 1 Mbps
        assert!((estimator.estimate(&NodeId(2)).unwrap() - 1.1).abs() < EPS);
    }

    #[test]
    fn test_staleness_boundary() {
        let config = queue_aware_config();
        let neighbors = neighbors();
        let mut backlog = BacklogTracker::new();
        backlog.record(NodeId(2), 125_000, Duration::ZERO);
        let link = link_with_bitrate(Some(1_000_000.0));
        let delta = Duration::from_millis(1);
        let max_age = config.max_backlog_age();

        let just_fresh = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            max_age - delta,
        );
        assert_eq!(just_fresh.breakdown(&NodeId(2)).unwrap().1, QueueTerm::Applied);

        let just_stale = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            max_age + delta,
        );
        let (estimate, term) = just_stale.breakdown(&NodeId(2)).unwrap();
        assert_eq!(term, QueueTerm::Stale);
        assert!((estimate.total() - 0.1).abs() < EPS);
    }

    #[test]
    fn test_unresolvable_bitrate_degrades_silently() {
        let config = queue_aware_config();
        let neighbors = neighbors();
        let mut backlog = BacklogTracker::new();
        backlog.record(NodeId(2), 125_000, Duration::ZERO);

        for bitrate in [None, Some(0.0), Some(-5.0)] {
            let link = link_with_bitrate(bitrate);
            let estimator = DelayEstimator::new(
                &config,
                Position::ZERO,
                &neighbors,
                &backlog,
                &link,
                Duration::ZERO,
            );
            let (estimate, term) = estimator.breakdown(&NodeId(2)).unwrap();
            assert_eq!(term, QueueTerm::UnknownBitrate);
            assert!((estimate.total() - 0.1).abs() < EPS);
        }
    }

    #[test]
    fn test_missing_report_is_distance_only() {
        let config = queue_aware_config();
        let neighbors = neighbors();
        let backlog = BacklogTracker::new();
        let mut link = MockLinkLayer::new();
        link.expect_neighbor_bitrate().never();

        let estimator = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            Duration::ZERO,
        );
        assert_eq!(estimator.breakdown(&NodeId(2)).unwrap().1, QueueTerm::NoReport);
    }

    #[test]
    fn test_unknown_neighbor_is_an_error() {
        let config = queue_aware_config();
        let neighbors = neighbors();
        let backlog = BacklogTracker::new();
        let link = MockLinkLayer::new();

        let estimator = DelayEstimator::new(
            &config,
            Position::ZERO,
            &neighbors,
            &backlog,
            &link,
            Duration::ZERO,
        );
        assert_eq!(
            estimator.estimate(&NodeId(9)),
            Err(DirectoryError::NotFound(NodeId(9)))
        );
    }
}
