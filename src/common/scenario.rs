//! Scenario loading, parsing, and validation.
//!
//! A scenario describes everything the router needs at startup: denied
//! regions, ground stations, the Walker shells whose satellites the demo
//! feed propagates, and the flows to keep routed. An optional script of
//! timed actions drives network changes after startup.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::routing::controller::{FlowId, FlowSpec};
use crate::routing::regions::RegionDefinition;
use crate::routing::types::{EdgeKind, GeoPosition, LinkAssessment, PathOptions};
use crate::time_driver::{MAX_TIME_WARP_PERCENT, MIN_TIME_WARP_PERCENT};

/// Error type for scenario loading failures.
#[derive(Debug)]
pub enum ScenarioLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ScenarioLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            ScenarioLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            ScenarioLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ScenarioLoadError {}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundStationDefinition {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Height above the mean Earth radius in km.
    #[serde(default)]
    pub alt_km: f64,
}

impl GroundStationDefinition {
    pub fn geo(&self) -> GeoPosition {
        GeoPosition::new(self.lat, self.lon, self.alt_km)
    }
}

/// Walker delta shell: `planes` evenly spaced orbital planes with
/// `sats_per_plane` satellites each, all on circular orbits.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellDefinition {
    pub name: String,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub planes: u32,
    pub sats_per_plane: u32,
    /// Walker phasing factor F.
    #[serde(default)]
    pub phasing: u32,
}

impl ShellDefinition {
    pub fn satellite_id(&self, plane: u32, index: u32) -> String {
        format!("sat_{}_{}_{}", self.name, plane, index)
    }

    pub fn satellite_count(&self) -> usize {
        self.planes as usize * self.sats_per_plane as usize
    }

    pub fn satellite_ids(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.planes).flat_map(move |plane| (0..self.sats_per_plane).map(move |index| self.satellite_id(plane, index)))
    }
}

fn default_link_kind() -> EdgeKind {
    EdgeKind::InterSatellite
}

/// Network change applied by the scenario script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    AddSatellite {
        id: String,
        lat: f64,
        lon: f64,
        alt_km: f64,
    },
    AddGroundStation {
        id: String,
        lat: f64,
        lon: f64,
        #[serde(default)]
        alt_km: f64,
    },
    Connect {
        from: String,
        to: String,
        #[serde(default = "default_link_kind")]
        kind: EdgeKind,
        #[serde(default)]
        bandwidth: Option<f64>,
    },
    AssessLink {
        from: String,
        to: String,
        assessment: LinkAssessment,
    },
    /// Forecast outage between `start_s` and `end_s` after the script epoch.
    PredictOutage {
        from: String,
        to: String,
        start_s: f64,
        end_s: f64,
        #[serde(default)]
        reason: String,
    },
    ClearPrediction {
        from: String,
        to: String,
    },
    RemoveNode {
        id: String,
    },
    RegisterFlow {
        flow: FlowSpec,
    },
    RemoveFlow {
        flow_id: FlowId,
    },
    /// One-off query. Without options every alternative path is reported.
    RequestPath {
        source: String,
        destination: String,
        #[serde(default)]
        options: Option<PathOptions>,
    },
    SetTimeWarp {
        percent: u32,
    },
    /// Log a summary of the whole network.
    ReportNetwork,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduledAction {
    /// Seconds after startup, on the (warped) routing clock.
    pub at_s: f64,
    pub action: ScenarioAction,
}

/// Root structure of a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub regions: Vec<RegionDefinition>,
    #[serde(default)]
    pub ground_stations: Vec<GroundStationDefinition>,
    #[serde(default)]
    pub shells: Vec<ShellDefinition>,
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
    #[serde(default)]
    pub actions: Vec<ScheduledAction>,
}

/// Load, parse and validate a scenario file.
pub fn load_scenario(path: &str) -> Result<Scenario, ScenarioLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| ScenarioLoadError::FileReadError(e.to_string()))?;

    parse_scenario(&data)
}

pub fn parse_scenario(data: &str) -> Result<Scenario, ScenarioLoadError> {
    let scenario: Scenario = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| ScenarioLoadError::ParseError(format!("{:#}", e)))?;

    validate_scenario(&scenario).map_err(ScenarioLoadError::ValidationError)?;

    Ok(scenario)
}

/// Validate a parsed scenario.
///
/// Returns `Err` with a description of the first problem found.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), String> {
    const MAX_NODES: usize = 100_000;

    let node_count = scenario.ground_stations.len() + scenario.shells.iter().map(ShellDefinition::satellite_count).sum::<usize>();
    if node_count == 0 {
        return Err("Scenario must contain at least one ground station or shell".to_string());
    }
    if node_count > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", node_count, MAX_NODES));
    }

    // Regions
    let mut region_names = HashSet::new();
    for region in &scenario.regions {
        let name = region.name.trim().to_lowercase();
        if name.is_empty() {
            return Err("Region name must not be empty".to_string());
        }
        if !region_names.insert(name.clone()) {
            return Err(format!("Duplicate region name: {}", name));
        }
        if region.polygon.len() < 3 {
            return Err(format!("Region {} needs at least 3 vertices, got {}", name, region.polygon.len()));
        }
        for &(lat, lon) in &region.polygon {
            if !valid_lat_lon(lat, lon) {
                return Err(format!("Region {} has vertex ({}, {}) outside lat/lon range", name, lat, lon));
            }
        }
        for &(low, high) in &region.constraints.frequency_limits {
            if !(low <= high) {
                return Err(format!("Region {} has invalid frequency band {}-{} MHz", name, low, high));
            }
        }
    }

    // Ground stations
    let mut node_ids = HashSet::new();
    for gs in &scenario.ground_stations {
        if gs.id.is_empty() {
            return Err("Ground station id must not be empty".to_string());
        }
        if !node_ids.insert(gs.id.clone()) {
            return Err(format!("Duplicate ground station id: {}", gs.id));
        }
        if !valid_lat_lon(gs.lat, gs.lon) {
            return Err(format!("Ground station {} position ({}, {}) outside lat/lon range", gs.id, gs.lat, gs.lon));
        }
    }

    // Shells
    let mut shell_names = HashSet::new();
    for shell in &scenario.shells {
        if shell.name.is_empty() {
            return Err("Shell name must not be empty".to_string());
        }
        if !shell_names.insert(shell.name.as_str()) {
            return Err(format!("Duplicate shell name: {}", shell.name));
        }
        if shell.planes == 0 || shell.sats_per_plane == 0 {
            return Err(format!("Shell {} needs at least one plane and one satellite per plane", shell.name));
        }
        if !(shell.altitude_km > 0.0) {
            return Err(format!("Shell {} altitude {} km must be positive", shell.name, shell.altitude_km));
        }
        if !(0.0..=180.0).contains(&shell.inclination_deg) {
            return Err(format!("Shell {} inclination {} deg outside 0-180", shell.name, shell.inclination_deg));
        }
        for id in shell.satellite_ids() {
            if !node_ids.insert(id.clone()) {
                return Err(format!("Satellite id {} collides with another node", id));
            }
        }
    }

    // Nodes added by the script may be referenced anywhere in it
    for (idx, scheduled) in scenario.actions.iter().enumerate() {
        if let ScenarioAction::AddSatellite { id, .. } | ScenarioAction::AddGroundStation { id, .. } = &scheduled.action {
            if id.is_empty() {
                return Err(format!("Action {} adds a node with an empty id", idx));
            }
            if !node_ids.insert(id.clone()) {
                return Err(format!("Action {} adds node {} which already exists", idx, id));
            }
        }
    }

    // Flows
    for (idx, flow) in scenario.flows.iter().enumerate() {
        for endpoint in [&flow.source, &flow.destination] {
            if !node_ids.contains(endpoint) {
                return Err(format!("Flow {} references unknown node {}", idx, endpoint));
            }
        }
    }

    // Actions
    for (idx, scheduled) in scenario.actions.iter().enumerate() {
        if !scheduled.at_s.is_finite() || scheduled.at_s < 0.0 {
            return Err(format!("Action {} time {} s must be finite and non-negative", idx, scheduled.at_s));
        }
        validate_action(&scheduled.action, &node_ids).map_err(|e| format!("Action {}: {}", idx, e))?;
    }

    Ok(())
}

fn validate_action(action: &ScenarioAction, node_ids: &HashSet<String>) -> Result<(), String> {
    let known = |id: &String| {
        if node_ids.contains(id) {
            Ok(())
        } else {
            Err(format!("unknown node {}", id))
        }
    };
    match action {
        ScenarioAction::AddSatellite { lat, lon, alt_km, .. } | ScenarioAction::AddGroundStation { lat, lon, alt_km, .. } => {
            if !valid_lat_lon(*lat, *lon) {
                return Err(format!("position ({}, {}) outside lat/lon range", lat, lon));
            }
            if !alt_km.is_finite() {
                return Err(format!("altitude {} km is not finite", alt_km));
            }
            Ok(())
        }
        ScenarioAction::Connect { from, to, bandwidth, .. } => {
            known(from)?;
            known(to)?;
            if from == to {
                return Err(format!("link from {} to itself", from));
            }
            match bandwidth {
                Some(b) if !(*b > 0.0) => Err(format!("bandwidth {} must be positive", b)),
                _ => Ok(()),
            }
        }
        ScenarioAction::AssessLink { from, to, .. } | ScenarioAction::ClearPrediction { from, to } => {
            known(from)?;
            known(to)
        }
        ScenarioAction::PredictOutage { from, to, start_s, end_s, .. } => {
            known(from)?;
            known(to)?;
            if !(start_s.is_finite() && end_s.is_finite() && start_s < end_s) {
                return Err(format!("outage {}-{} s must start before it ends", start_s, end_s));
            }
            Ok(())
        }
        ScenarioAction::RemoveNode { id } => known(id),
        ScenarioAction::RegisterFlow { flow } => {
            known(&flow.source)?;
            known(&flow.destination)
        }
        ScenarioAction::RequestPath { source, destination, options } => {
            known(source)?;
            known(destination)?;
            match options {
                Some(o) if !o.time_offset_seconds.is_finite() => Err(format!("time offset {} s is not finite", o.time_offset_seconds)),
                _ => Ok(()),
            }
        }
        ScenarioAction::SetTimeWarp { percent } => {
            if (MIN_TIME_WARP_PERCENT..=MAX_TIME_WARP_PERCENT).contains(percent) {
                Ok(())
            } else {
                Err(format!("time warp {}% outside {}-{}", percent, MIN_TIME_WARP_PERCENT, MAX_TIME_WARP_PERCENT))
            }
        }
        ScenarioAction::RemoveFlow { .. } | ScenarioAction::ReportNetwork => Ok(()),
    }
}

fn valid_lat_lon(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
