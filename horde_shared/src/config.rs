//! Configuration system.
//!
//! Loads configuration from JSON strings or files. Every field has a default
//! so a partial file only overrides what it names.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HordeConfig {
    /// Feed server address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Module (database) name the client asks for in its handshake.
    pub module: String,
    /// Server world tick rate.
    pub tick_hz: u32,
    /// Client frame rate for the headless loop.
    pub frame_hz: u32,
    /// Seconds a view takes to glide to a new remote position.
    pub interp_secs: f64,
    /// Minimum seconds between local position reports.
    pub report_interval_secs: f64,
    /// Minimum squared distance moved before a report is sent.
    pub report_min_distance_sq: f64,
    /// Player name (client only).
    pub player_name: String,
}

impl Default for HordeConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            module: "zombies".to_string(),
            tick_hz: 10,
            frame_hz: 60,
            interp_secs: 0.1,
            report_interval_secs: 0.1,
            report_min_distance_sq: 0.01,
            player_name: "Player".to_string(),
        }
    }
}

impl HordeConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = HordeConfig::from_json_str(r#"{"server_addr":"10.0.0.2:4000","interp_secs":0.25}"#)
            .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.2:4000");
        assert_eq!(cfg.interp_secs, 0.25);
        assert_eq!(cfg.module, "zombies");
        assert_eq!(cfg.report_interval_secs, 0.1);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = HordeConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }
}
