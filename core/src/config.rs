//! Router configuration
//!
//! Settings that control beaconing, neighbor expiry, planarization and the
//! delay-aware greedy tie-break. Values are plain numbers in seconds and meters
//! so configs stay readable as JSON; accessors hand out `Duration`s.

use crate::planar::PlanarizationMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown planarization mode: {0:?}")]
    UnknownPlanarizationMode(String),

    #[error("Unknown routing mode: {0}")]
    UnknownRoutingMode(u8),

    #[error("Beacon interval must be > 0, got {0}")]
    InvalidBeaconInterval(f64),

    #[error("Beacon jitter must be >= 0 and below the beacon interval, got {0}")]
    InvalidJitter(f64),

    #[error("Neighbor validity interval must be > 0, got {0}")]
    InvalidNeighborValidity(f64),

    #[error("Distance equality threshold must be >= 0, got {0}")]
    InvalidDistanceThreshold(f64),

    #[error("Delay estimation factor must be >= 0, got {0}")]
    InvalidDelayFactor(f64),

    #[error("{field} of {value} s does not fit a duration")]
    DurationOutOfRange { field: &'static str, value: f64 },

    #[error("Output interface name must not be empty")]
    MissingOutputInterface,

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Planar subgraph used by perimeter forwarding
    pub planarization_mode: PlanarizationMode,

    /// Interface name pattern joining the MANET routers group
    pub interfaces: String,

    /// Single egress interface for forwarded datagrams
    pub output_interface: String,

    /// Nominal period between beacons (seconds)
    pub beacon_interval_secs: f64,

    /// Maximum deviation applied to each beacon period (seconds)
    pub max_jitter_secs: f64,

    /// How long a neighbor stays valid without a fresh beacon (seconds)
    pub neighbor_validity_secs: f64,

    /// On-wire size of one position
    pub position_byte_length: usize,

    /// Break greedy distance ties by estimated delay
    pub enable_delay_tiebreaker: bool,

    /// Distances closer than this are a tie (meters)
    pub distance_equality_threshold: f64,

    /// Propagation delay charged per meter (seconds)
    pub delay_estimation_factor: f64,

    /// Add advertised neighbor backlog to delay estimates
    pub enable_queue_delay: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            planarization_mode: PlanarizationMode::Gabriel,
            interfaces: "*".to_string(),
            output_interface: "wlan0".to_string(),
            beacon_interval_secs: 10.0,
            max_jitter_secs: 5.0,
            neighbor_validity_secs: 45.0,
            position_byte_length: 8,
            enable_delay_tiebreaker: false,
            distance_equality_threshold: 1.0,
            delay_estimation_factor: 0.001,
            enable_queue_delay: false,
        }
    }
}

impl RoutingConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RoutingConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.beacon_interval_secs > 0.0) {
            return Err(ConfigError::InvalidBeaconInterval(self.beacon_interval_secs));
        }
        if !(self.max_jitter_secs >= 0.0 && self.max_jitter_secs < self.beacon_interval_secs) {
            return Err(ConfigError::InvalidJitter(self.max_jitter_secs));
        }
        if !(self.neighbor_validity_secs > 0.0) {
            return Err(ConfigError::InvalidNeighborValidity(
                self.neighbor_validity_secs,
            ));
        }
        if !(self.distance_equality_threshold >= 0.0) {
            return Err(ConfigError::InvalidDistanceThreshold(
                self.distance_equality_threshold,
            ));
        }
        if !(self.delay_estimation_factor >= 0.0) {
            return Err(ConfigError::InvalidDelayFactor(self.delay_estimation_factor));
        }
        if self.output_interface.is_empty() {
            return Err(ConfigError::MissingOutputInterface);
        }

        let interval = seconds("beacon_interval_secs", self.beacon_interval_secs)?;
        seconds("max_jitter_secs", self.max_jitter_secs)?;
        seconds("neighbor_validity_secs", self.neighbor_validity_secs)?;
        // Backlog age is three intervals; the longest jittered period is below two.
        interval
            .checked_mul(3)
            .ok_or(ConfigError::DurationOutOfRange {
                field: "beacon_interval_secs",
                value: self.beacon_interval_secs,
            })?;
        Ok(())
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs_f64(self.beacon_interval_secs)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_secs_f64(self.max_jitter_secs)
    }

    pub fn neighbor_validity(&self) -> Duration {
        Duration::from_secs_f64(self.neighbor_validity_secs)
    }

    /// Backlog reports older than this are ignored
    pub fn max_backlog_age(&self) -> Duration {
        self.beacon_interval() * 3
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::DurationOutOfRange { field, value })
}
