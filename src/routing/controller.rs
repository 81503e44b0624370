//! Routing controller: owns the graph and keeps registered flows routed.
//!
//! This is the glue between the position feed, the graph store and the path
//! finder. It applies node updates one at a time, maintains ground links as
//! satellites come in and out of range, recomputes flow paths on each tick,
//! and turns everything that changed into `RoutingEvent`s for consumers.
//!
//! Invalid requests (unknown nodes, duplicate registrations) are logged and
//! ignored so a bad update never stalls the loop.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::events::RoutingEvent;
use super::graph::NetworkGraph;
use super::pathfinding::{DEFAULT_PREDICTIVE_OFFSETS, calculate_predictive_paths, find_all_paths, find_shortest_path};
use super::regions::GeoRegionIndex;
use super::types::{EdgeKind, GeoPosition, GraphError, LinkAssessment, NetworkPath, NodeKind, OptimizeFor, PathOptions, PredictiveWindow, Vec3};

pub type FlowId = u32;

fn default_avoid_denied_regions() -> bool {
    true
}

/// A source/destination pair whose route the controller keeps current.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowSpec {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub optimize_for: OptimizeFor,
    #[serde(default = "default_avoid_denied_regions")]
    pub avoid_denied_regions: bool,
}

impl FlowSpec {
    fn options(&self) -> PathOptions {
        PathOptions {
            optimize_for: self.optimize_for,
            avoid_denied_regions: self.avoid_denied_regions,
            time_offset_seconds: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    /// Mbps assigned to links created without an explicit bandwidth.
    pub default_bandwidth: f64,
    /// Maximum slant range for a ground station to satellite link.
    pub ground_link_max_range_km: f64,
    /// Upper bound for `query_all_paths`.
    pub max_paths: usize,
    pub predictive_offsets: Vec<u32>,
    /// Publish a predictive preview for every flow on each tick.
    pub predictive_paths: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_bandwidth: 1000.0,
            ground_link_max_range_km: 2500.0,
            max_paths: 3,
            predictive_offsets: DEFAULT_PREDICTIVE_OFFSETS.to_vec(),
            predictive_paths: false,
        }
    }
}

/// Route last published for a flow: path id and activity, or no route.
type PublishedRoute = Option<(String, bool)>;

struct FlowState {
    spec: FlowSpec,
    published: Option<PublishedRoute>,
}

/// Ground link churn from one `refresh_ground_links` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroundLinkRefresh {
    pub added: usize,
    pub removed: usize,
}

pub struct RoutingController {
    graph: NetworkGraph,
    settings: ControllerSettings,
    flows: BTreeMap<FlowId, FlowState>,
    next_flow_id: FlowId,
}

impl RoutingController {
    pub fn new(regions: Arc<GeoRegionIndex>, settings: ControllerSettings) -> Self {
        Self {
            graph: NetworkGraph::new(regions, settings.default_bandwidth),
            settings,
            flows: BTreeMap::new(),
            next_flow_id: 1,
        }
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn add_satellite(&mut self, id: &str, position: Vec3, geo: Option<GeoPosition>) -> bool {
        self.add_node(id, NodeKind::Satellite, position, geo)
    }

    /// Ground stations are static, so their position is derived from `geo` once.
    pub fn add_ground_station(&mut self, id: &str, geo: GeoPosition) -> bool {
        self.add_node(id, NodeKind::GroundStation, geo.to_ecef(), Some(geo))
    }

    fn add_node(&mut self, id: &str, kind: NodeKind, position: Vec3, geo: Option<GeoPosition>) -> bool {
        match self.graph.add_node(id, kind, position, geo) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Ignoring node registration: {}", err);
                false
            }
        }
    }

    /// Apply one feed update and report what it changed.
    ///
    /// Updates for nodes that are not registered yet are dropped quietly;
    /// the feed can run ahead of registration during startup.
    pub fn update_node_position(&mut self, id: &str, position: Vec3, geo: Option<GeoPosition>) -> Vec<RoutingEvent> {
        let update = match self.graph.update_node_position(id, position, geo) {
            Ok(update) => update,
            Err(GraphError::UnknownNode(_)) => {
                log::debug!("Position update for unregistered node {} dropped", id);
                return Vec::new();
            }
            Err(err) => {
                log::warn!("Position update for {} failed: {}", id, err);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if update.region_changed() {
            log::debug!("Node {} region {:?} -> {:?}", id, update.previous_region, update.region);
            events.push(RoutingEvent::NodeRegionChanged {
                node_id: id.to_string(),
                region: update.region.clone(),
            });
        }
        for (from, to, active) in update.activity_changes {
            events.push(RoutingEvent::EdgeActivityChanged { from, to, active });
        }
        events
    }

    pub fn connect(&mut self, from: &str, to: &str, kind: EdgeKind, bandwidth: Option<f64>) -> bool {
        match self.graph.add_or_update_edge(from, to, kind, bandwidth) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Ignoring link {} - {}: {}", from, to, err);
                false
            }
        }
    }

    pub fn assess_link(&mut self, from: &str, to: &str, assessment: &LinkAssessment) -> Vec<RoutingEvent> {
        match self.graph.apply_link_assessment(from, to, assessment) {
            Ok(true) => {
                let active = self.graph.get_edge(from, to).is_some_and(|e| e.active);
                vec![RoutingEvent::EdgeActivityChanged {
                    from: from.to_string(),
                    to: to.to_string(),
                    active,
                }]
            }
            Ok(false) => Vec::new(),
            Err(err) => {
                log::warn!("Ignoring link assessment: {}", err);
                Vec::new()
            }
        }
    }

    pub fn predict_edge_window(&mut self, from: &str, to: &str, window: Option<PredictiveWindow>) -> bool {
        match self.graph.set_predictive_window(from, to, window) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Ignoring predictive window: {}", err);
                false
            }
        }
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        self.graph.remove_node(id).is_some()
    }

    /// Link every ground station to every satellite above its horizon and
    /// within range; drop ground links that no longer qualify.
    pub fn refresh_ground_links(&mut self) -> GroundLinkRefresh {
        let max_range_km = self.settings.ground_link_max_range_km;
        let stations: Vec<(String, Vec3)> = self
            .graph
            .nodes()
            .filter(|n| n.kind == NodeKind::GroundStation)
            .map(|n| (n.id.clone(), n.position))
            .collect();
        let satellites: Vec<(String, Vec3)> = self
            .graph
            .nodes()
            .filter(|n| n.kind == NodeKind::Satellite)
            .map(|n| (n.id.clone(), n.position))
            .collect();

        let mut refresh = GroundLinkRefresh::default();
        for (station_id, station_pos) in &stations {
            for (sat_id, sat_pos) in &satellites {
                let visible = above_horizon(station_pos, sat_pos) && station_pos.distance_to(sat_pos) <= max_range_km;
                let linked = self.graph.get_edge(station_id, sat_id).is_some();
                if visible && !linked {
                    if self.connect(station_id, sat_id, EdgeKind::GroundLink, None) {
                        refresh.added += 1;
                    }
                } else if !visible && linked && self.graph.remove_edge(station_id, sat_id) {
                    refresh.removed += 1;
                }
            }
        }
        refresh
    }

    pub fn register_flow(&mut self, spec: FlowSpec) -> FlowId {
        if !self.graph.contains_node(&spec.source) || !self.graph.contains_node(&spec.destination) {
            log::warn!("Flow {} -> {} references unregistered nodes; it stays unroutable until they appear", spec.source, spec.destination);
        }
        let id = self.next_flow_id;
        self.next_flow_id += 1;
        self.flows.insert(id, FlowState { spec, published: None });
        id
    }

    pub fn remove_flow(&mut self, id: FlowId) -> bool {
        self.flows.remove(&id).is_some()
    }

    pub fn flows(&self) -> impl Iterator<Item = (FlowId, &FlowSpec)> {
        self.flows.iter().map(|(&id, state)| (id, &state.spec))
    }

    /// Route every flow against the current graph.
    ///
    /// A `PathUpdated` event is produced the first time a flow is routed and
    /// whenever its route id, its activity or its routability changes. With
    /// predictive previews enabled, every flow also gets a `PredictivePaths`
    /// event.
    pub fn recompute_flows(&mut self, now_ms: i64) -> Vec<RoutingEvent> {
        let mut events = Vec::new();
        for (&flow_id, state) in self.flows.iter_mut() {
            let path = find_shortest_path(&self.graph, &state.spec.source, &state.spec.destination, &state.spec.options(), now_ms);
            let route: PublishedRoute = path.as_ref().map(|p| (p.id.clone(), p.is_active));
            if state.published.as_ref() != Some(&route) {
                match &path {
                    Some(p) => log::info!("Flow {} routed via {} ({:.2} ms, {} hops)", flow_id, p.id, p.total_delay, p.hop_count()),
                    None => log::info!("Flow {} ({} -> {}) has no route", flow_id, state.spec.source, state.spec.destination),
                }
                state.published = Some(route);
                events.push(RoutingEvent::PathUpdated { flow_id, path });
            }

            if self.settings.predictive_paths {
                let paths = calculate_predictive_paths(&self.graph, &state.spec.source, &state.spec.destination, &self.settings.predictive_offsets, now_ms);
                events.push(RoutingEvent::PredictivePaths { flow_id, paths });
            }
        }
        events
    }

    pub fn query_path(&self, source: &str, destination: &str, options: &PathOptions, now_ms: i64) -> Option<NetworkPath> {
        find_shortest_path(&self.graph, source, destination, options, now_ms)
    }

    pub fn query_all_paths(&self, source: &str, destination: &str, now_ms: i64) -> Vec<NetworkPath> {
        find_all_paths(&self.graph, source, destination, self.settings.max_paths, now_ms)
    }
}

/// Whether `target` is above the local horizon of `observer` on a spherical Earth.
fn above_horizon(observer: &Vec3, target: &Vec3) -> bool {
    let dx = target.x - observer.x;
    let dy = target.y - observer.y;
    let dz = target.z - observer.z;
    dx * observer.x + dy * observer.y + dz * observer.z > 0.0
}
