//! Runtime configuration loaded from `config.toml`.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::routing::controller::ControllerSettings;
use crate::routing::pathfinding::DEFAULT_PREDICTIVE_OFFSETS;
use crate::routing::regions::CrossingMode;

/// Router settings. Every key is optional; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RouterConfig {
    /// Interval between routing ticks (virtual time).
    pub tick_interval_ms: u64,
    /// Interval between demo feed position sweeps (virtual time).
    pub feed_interval_ms: u64,
    pub default_bandwidth_mbps: f64,
    pub ground_link_max_range_km: f64,
    /// Virtual clock speed, 100 = real time.
    pub time_warp_percent: u32,
    pub max_paths: usize,
    pub predictive_offsets_s: Vec<u32>,
    pub predictive_paths: bool,
    pub crossing_mode: CrossingMode,
    /// Stop after this many wall-clock seconds; runs forever when unset.
    pub run_seconds: Option<u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            feed_interval_ms: 1000,
            default_bandwidth_mbps: 1000.0,
            ground_link_max_range_km: 2500.0,
            time_warp_percent: 100,
            max_paths: 3,
            predictive_offsets_s: DEFAULT_PREDICTIVE_OFFSETS.to_vec(),
            predictive_paths: false,
            crossing_mode: CrossingMode::Sampled,
            run_seconds: None,
        }
    }
}

impl RouterConfig {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(config_path).with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: RouterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config_path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            log::info!("No config at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Derive the config path from a scenario file path.
    ///
    /// Replaces the scenario filename with "config.toml" in the same directory.
    pub fn config_path_from_scenario(scenario_path: &str) -> PathBuf {
        let scenario = Path::new(scenario_path);
        scenario.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.tick_interval_ms > 0, "tick-interval-ms must be positive");
        anyhow::ensure!(self.feed_interval_ms > 0, "feed-interval-ms must be positive");
        anyhow::ensure!(self.default_bandwidth_mbps > 0.0, "default-bandwidth-mbps must be positive");
        anyhow::ensure!(self.ground_link_max_range_km > 0.0, "ground-link-max-range-km must be positive");
        anyhow::ensure!(
            (1..=1000).contains(&self.time_warp_percent),
            "time-warp-percent must be within 1-1000, got {}",
            self.time_warp_percent
        );
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            default_bandwidth: self.default_bandwidth_mbps,
            ground_link_max_range_km: self.ground_link_max_range_km,
            max_paths: self.max_paths,
            predictive_offsets: self.predictive_offsets_s.clone(),
            predictive_paths: self.predictive_paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = RouterConfig::parse("").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.controller_settings(), ControllerSettings::default());
    }

    #[test]
    fn kebab_case_keys() {
        let config = RouterConfig::parse(
            r#"
            tick-interval-ms = 250
            time-warp-percent = 400
            crossing-mode = "exact"
            predictive-paths = true
            predictive-offsets-s = [30, 90]
            run-seconds = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.time_warp_percent, 400);
        assert_eq!(config.crossing_mode, CrossingMode::Exact);
        assert_eq!(config.run_seconds, Some(10));
        assert_eq!(config.controller_settings().predictive_offsets, vec![30, 90]);
        assert_eq!(config.max_paths, 3);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(RouterConfig::parse("time-warp-percent = 0").is_err());
        assert!(RouterConfig::parse("tick-interval-ms = 0").is_err());
        assert!(RouterConfig::parse("crossing-mode = \"fuzzy\"").is_err());
    }

    #[test]
    fn config_path_sits_next_to_scenario() {
        assert_eq!(RouterConfig::config_path_from_scenario("demos/leo.json"), PathBuf::from("demos/config.toml"));
        assert_eq!(RouterConfig::config_path_from_scenario("leo.json"), PathBuf::from("config.toml"));
        let missing = RouterConfig::load_or_default(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(missing, RouterConfig::default());
    }
}
