// Routing config loading for the qgpsr CLI
//
// Configs are JSON files holding any subset of `RoutingConfig`; missing
// fields take their defaults. No file means the defaults as is.

use anyhow::{Context, Result};
use qgpsr_core::RoutingConfig;
use std::path::Path;

/// Load and validate a routing config, or fall back to the defaults
pub fn load(path: Option<&Path>) -> Result<RoutingConfig> {
    let Some(path) = path else {
        return Ok(RoutingConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = RoutingConfig::from_json(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(config)
}

/// Default config as pretty JSON
pub fn default_json() -> Result<String> {
    serde_json::to_string_pretty(&RoutingConfig::default())
        .context("Failed to serialize default config")
}
