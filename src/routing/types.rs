//! Type definitions shared by the routing components.
//!
//! Contains:
//! - Node and edge records stored by the network graph
//! - Crossing and predictive availability metadata attached to edges
//! - Path query options and the resulting `NetworkPath`
//! - Errors reported by graph mutations

use serde::Deserialize;
use std::collections::BTreeSet;

/// Speed of light in vacuum, km/s. Link delay is derived from this and distance only.
pub const SPEED_OF_LIGHT_KM_PER_S: f64 = 299_792.458;

/// Mean Earth radius in km, used when deriving positions from geographic coordinates.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Earth-centred Cartesian coordinate in km.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Geographic position: degrees and km above the mean Earth radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
}

impl GeoPosition {
    pub const fn new(lat: f64, lon: f64, alt_km: f64) -> Self {
        Self { lat, lon, alt_km }
    }

    /// Spherical-Earth conversion to the Earth-centred frame used for node positions.
    pub fn to_ecef(&self) -> Vec3 {
        let r = EARTH_RADIUS_KM + self.alt_km;
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        Vec3 {
            x: r * lat.cos() * lon.cos(),
            y: r * lat.cos() * lon.sin(),
            z: r * lat.sin(),
        }
    }

    /// Inverse of [`GeoPosition::to_ecef`].
    pub fn from_ecef(p: &Vec3) -> Self {
        let r = p.norm();
        if r == 0.0 {
            return Self::new(0.0, 0.0, -EARTH_RADIUS_KM);
        }
        Self {
            lat: (p.z / r).asin().to_degrees(),
            lon: p.y.atan2(p.x).to_degrees(),
            alt_km: r - EARTH_RADIUS_KM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Satellite,
    GroundStation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Laser or RF link between two satellites.
    InterSatellite,
    /// Up/down link between a ground station and a satellite.
    GroundLink,
}

/// Satellite or ground station in the routing graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub position: Vec3,
    pub geo: Option<GeoPosition>,
    /// Symmetric adjacency: if A lists B, B lists A.
    pub connections: BTreeSet<String>,
    /// Region containing `geo`, recomputed on every geo change.
    pub denied_region: Option<String>,
}

impl Node {
    pub fn in_denied_region(&self) -> bool {
        self.denied_region.is_some()
    }
}

/// Result of testing an edge's ground track against the region index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crossing {
    pub is_denied_region: bool,
    /// First region met walking the segment from the endpoint with the smaller id.
    pub region_name: Option<String>,
    /// Some crossed region (not necessarily `region_name`) forbids transmission.
    pub blocks_transmission: bool,
}

/// Forecast availability change for an edge, in epoch milliseconds.
///
/// When `unavailable_at < available_at` the edge drops out during
/// `[unavailable_at, available_at)`. When `available_at < unavailable_at`
/// the edge only exists during `[available_at, unavailable_at)`. Equal
/// bounds describe an empty window and never affect the edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveWindow {
    pub available_at: i64,
    pub unavailable_at: i64,
    pub reason: String,
}

impl PredictiveWindow {
    pub fn is_unavailable_at(&self, time_ms: i64) -> bool {
        match self.unavailable_at.cmp(&self.available_at) {
            std::cmp::Ordering::Less => time_ms >= self.unavailable_at && time_ms < self.available_at,
            std::cmp::Ordering::Greater => time_ms < self.available_at || time_ms >= self.unavailable_at,
            std::cmp::Ordering::Equal => false,
        }
    }
}

/// Opaque verdict from an external RF/regulatory engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkAssessment {
    pub compliant: bool,
    pub attenuation_db: Option<f64>,
    pub bandwidth: Option<f64>,
}

/// One direction of a candidate communication link.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    /// Straight-line distance in metres.
    pub distance: f64,
    /// Propagation delay in milliseconds.
    pub delay: f64,
    /// Mbps.
    pub bandwidth: f64,
    pub crossing: Crossing,
    pub active: bool,
    pub compliant: bool,
    pub attenuation_db: Option<f64>,
    pub predictive: Option<PredictiveWindow>,
}

/// Light-time over a straight segment, in milliseconds.
pub fn propagation_delay_ms(distance_m: f64) -> f64 {
    distance_m / 1000.0 * 1000.0 / SPEED_OF_LIGHT_KM_PER_S
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeFor {
    #[default]
    Delay,
    Distance,
}

/// Query options. Missing keys in a scenario file take the `Default` values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    pub optimize_for: OptimizeFor,
    pub avoid_denied_regions: bool,
    pub time_offset_seconds: f64,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            optimize_for: OptimizeFor::Delay,
            avoid_denied_regions: true,
            time_offset_seconds: 0.0,
        }
    }
}

/// Result of a path query. Computed fresh per query, never stored in the graph.
#[derive(Debug, Clone)]
pub struct NetworkPath {
    pub id: String,
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
    /// Milliseconds.
    pub total_delay: f64,
    /// Metres.
    pub total_distance: f64,
    pub crosses_denied_region: bool,
    pub denied_regions: Vec<String>,
    pub is_active: bool,
}

impl NetworkPath {
    pub fn hop_count(&self) -> usize {
        self.edges.len()
    }
}

/// Errors reported by graph mutations. The routing controller logs these and
/// keeps going; none of them is fatal to the update loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    DuplicateNode(String),
    UnknownNode(String),
    SelfLoop(String),
    UnknownEdge(String, String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::DuplicateNode(id) => write!(f, "Node {} is already registered", id),
            GraphError::UnknownNode(id) => write!(f, "Node {} is not registered", id),
            GraphError::SelfLoop(id) => write!(f, "Edge from {} to itself is not allowed", id),
            GraphError::UnknownEdge(from, to) => write!(f, "No edge between {} and {}", from, to),
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_matches_speed_of_light() {
        let delay = propagation_delay_ms(1_000_000.0);
        assert!((delay - 3.335_640_95).abs() < 1e-6, "delay was {}", delay);
    }

    #[test]
    fn geo_ecef_round_trip_keeps_coordinates() {
        let geo = GeoPosition::new(47.5, 19.04, 550.0);
        let back = GeoPosition::from_ecef(&geo.to_ecef());
        assert!((back.lat - geo.lat).abs() < 1e-9);
        assert!((back.lon - geo.lon).abs() < 1e-9);
        assert!((back.alt_km - geo.alt_km).abs() < 1e-6);
    }

    #[test]
    fn predictive_window_outage_orientation() {
        // Edge drops at 1000 and comes back at 2000
        let w = PredictiveWindow {
            available_at: 2000,
            unavailable_at: 1000,
            reason: "handover".into(),
        };
        assert!(!w.is_unavailable_at(999));
        assert!(w.is_unavailable_at(1000));
        assert!(w.is_unavailable_at(1999));
        assert!(!w.is_unavailable_at(2000));
    }

    #[test]
    fn predictive_window_visibility_orientation() {
        // Edge only exists between 1000 and 2000
        let w = PredictiveWindow {
            available_at: 1000,
            unavailable_at: 2000,
            reason: "pass".into(),
        };
        assert!(w.is_unavailable_at(500));
        assert!(!w.is_unavailable_at(1000));
        assert!(!w.is_unavailable_at(1500));
        assert!(w.is_unavailable_at(2000));
    }

    #[test]
    fn equal_bounds_are_an_empty_window() {
        let w = PredictiveWindow {
            available_at: 1000,
            unavailable_at: 1000,
            reason: "degenerate".into(),
        };
        for t in [0, 999, 1000, 1001, i64::MAX] {
            assert!(!w.is_unavailable_at(t));
        }
    }
}
