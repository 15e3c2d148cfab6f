//! Configuration system.
//!
//! Loads engine configuration from JSON. Every field has a default, so a
//! config file only needs to name what it changes.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::pmove::MoveTuning;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// JSON map to load. The built-in test course is used when absent.
    pub map: Option<String>,
    /// Player name (client only).
    pub player_name: String,
    /// Movement tuning the server starts with.
    pub tuning: MoveTuning,
    pub prediction: PredictionConfig,
}

/// Client prediction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Predicted commands kept for replay.
    pub history: usize,
    /// Allowed origin/velocity error before a correction. Zero demands exact
    /// agreement.
    pub tolerance: f32,
    /// Commands repeated in each command datagram to ride out packet loss.
    pub cmd_backup: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            history: 128,
            tolerance: 0.0,
            cmd_backup: 4,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 128,
            map: None,
            player_name: "Player".to_string(),
            tuning: MoveTuning::default(),
            prediction: PredictionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(s).context("parse config json")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("load config {}", path.display()))
    }

    /// Seconds per simulation tick.
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.tick_hz == 0 || self.tick_hz > 1000 {
            anyhow::bail!("tick_hz must be in 1..=1000, got {}", self.tick_hz);
        }
        if self.prediction.history == 0 {
            anyhow::bail!("prediction.history must be at least 1");
        }
        let tolerance = self.prediction.tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            anyhow::bail!("prediction.tolerance must be non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.tick_hz, 128);
        assert_eq!(config.tick_interval(), 1.0 / 128.0);
    }

    #[test]
    fn nested_sections_merge_with_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "tick_hz": 64,
                "map": "maps/course.json",
                "tuning": { "air_accelerate": 100.0 },
                "prediction": { "tolerance": 0.01 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.tick_hz, 64);
        assert_eq!(config.map.as_deref(), Some("maps/course.json"));
        assert_eq!(config.tuning.air_accelerate, 100.0);
        assert_eq!(config.tuning.gravity, 800.0);
        assert_eq!(config.prediction.tolerance, 0.01);
        assert_eq!(config.prediction.history, 128);
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        assert!(EngineConfig::from_json_str(r#"{ "tick_hz": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "prediction": { "tolerance": -1.0 } }"#).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = EngineConfig::load("/nonexistent/pmove.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/pmove.json"));
    }
}
