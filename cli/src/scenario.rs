// Scenario files for the simulator
//
// A scenario places nodes on the plane, fixes a radio range and lists the
// flows to inject. Stored as JSON, like the routing config.

use anyhow::{bail, Context, Result};
use qgpsr_core::{NodeId, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Beacons reach every node within this distance (meters)
    pub radio_range: f64,

    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub flows: Vec<FlowSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,

    /// Radio bitrate neighbors see for this node (bits per second)
    #[serde(default = "default_bitrate")]
    pub bitrate_bps: f64,

    /// Synthetic queue depth reported by the link layer
    #[serde(default)]
    pub backlog_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Injection time (seconds)
    pub at: f64,
    pub source: NodeId,
    pub destination: NodeId,
    #[serde(default = "default_flow_bytes")]
    pub bytes: usize,
}

fn default_bitrate() -> f64 {
    1_000_000.0
}

fn default_flow_bytes() -> usize {
    512
}

impl NodeSpec {
    pub fn position(&self) -> Position {
        Position::planar(self.x, self.y)
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.radio_range > 0.0) {
            bail!("Radio range must be > 0, got {}", self.radio_range);
        }

        let mut ids = BTreeSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                bail!("Duplicate node {}", node.id);
            }
        }

        for flow in &self.flows {
            if !ids.contains(&flow.source) || !ids.contains(&flow.destination) {
                bail!(
                    "Flow {} → {} references an unknown node",
                    flow.source,
                    flow.destination
                );
            }
            if Duration::try_from_secs_f64(flow.at).is_err() {
                bail!(
                    "Flow {} → {} has an invalid start time {} s",
                    flow.source,
                    flow.destination,
                    flow.at
                );
            }
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "radio_range": 15.0,
        "nodes": [
            { "id": 1, "x": 0.0, "y": 0.0 },
            { "id": 2, "x": 10.0, "y": 0.0, "backlog_bytes": 4096 }
        ],
        "flows": [ { "at": 12.5, "source": 1, "destination": 2 } ]
    }"#;

    #[test]
    fn test_load_scenario() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let scenario = Scenario::load(file.path()).unwrap();

        assert_eq!(scenario.nodes.len(), 2);
        assert_eq!(scenario.nodes[0].bitrate_bps, 1_000_000.0);
        assert_eq!(scenario.nodes[1].backlog_bytes, 4096);
        assert_eq!(scenario.flows[0].bytes, 512);
        assert_eq!(scenario.node(NodeId(2)).unwrap().position(), Position::planar(10.0, 0.0));
    }

    #[test]
    fn test_flow_to_unknown_node_is_rejected() {
        let mut scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        scenario.flows[0].destination = NodeId(7);
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let mut scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        scenario.nodes[1].id = NodeId(1);
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_flow_start_must_be_a_duration() {
        let mut scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        for at in [-1.0, f64::NAN, 1e20] {
            scenario.flows[0].at = at;
            let err = scenario.validate().unwrap_err();
            assert!(err.to_string().contains("invalid start time"));
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Scenario::load(Path::new("/nonexistent/scenario.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scenario.json"));
    }
}
