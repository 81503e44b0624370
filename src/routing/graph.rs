//! Network graph store.
//!
//! Holds satellites, ground stations and the links between them, and keeps
//! every edge's distance, delay, crossing and activity consistent with the
//! current node positions. Updates are incremental: moving a node repairs
//! only the edges touching it.
//!
//! Edges are stored once per direction (`from -> to` and `to -> from`) with
//! identical metadata, so path finding can walk outgoing edges directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::regions::GeoRegionIndex;
use super::types::{Crossing, Edge, EdgeKind, GeoPosition, GraphError, LinkAssessment, Node, NodeKind, PredictiveWindow, Vec3, propagation_delay_ms};

/// Summary of what a position update changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub previous_region: Option<String>,
    pub region: Option<String>,
    /// Incident links whose activity flipped, as (node, neighbor, now active).
    pub activity_changes: Vec<(String, String, bool)>,
}

impl NodeUpdate {
    pub fn region_changed(&self) -> bool {
        self.previous_region != self.region
    }
}

/// Geometry-derived state of a link, computed from its two endpoints.
struct LinkGeometry {
    distance_m: f64,
    crossing: Crossing,
}

/// Nodes and directed edge records. Cloning yields an independent snapshot.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, BTreeMap<String, Edge>>,
    regions: Arc<GeoRegionIndex>,
    default_bandwidth: f64,
}

impl NetworkGraph {
    pub fn new(regions: Arc<GeoRegionIndex>, default_bandwidth: f64) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            regions,
            default_bandwidth,
        }
    }

    /// Insert a new node. When `geo` is known, its containing region is looked up immediately.
    pub fn add_node(&mut self, id: &str, kind: NodeKind, position: Vec3, geo: Option<GeoPosition>) -> Result<(), GraphError> {
        if self.nodes.contains_key(id) {
            return Err(GraphError::DuplicateNode(id.to_string()));
        }

        let denied_region = self.region_at(geo.as_ref());
        if let Some(region) = &denied_region {
            log::debug!("Node {} registered inside denied region {}", id, region);
        }

        self.nodes.insert(
            id.to_string(),
            Node {
                id: id.to_string(),
                kind,
                position,
                geo,
                connections: BTreeSet::new(),
                denied_region,
            },
        );
        Ok(())
    }

    /// Move a node and repair everything derived from its position.
    ///
    /// Replaces `position` and `geo`, recomputes the containing region and
    /// then every incident edge (distance, delay, crossing, activity).
    ///
    /// # Returns
    ///
    /// `GraphError::UnknownNode` if the node was never registered. Callers
    /// driven by a position feed should treat that as a startup race.
    pub fn update_node_position(&mut self, id: &str, position: Vec3, geo: Option<GeoPosition>) -> Result<NodeUpdate, GraphError> {
        let region = self.region_at(geo.as_ref());
        let (previous_region, neighbors) = {
            let node = self.nodes.get_mut(id).ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
            node.position = position;
            node.geo = geo;
            let previous = std::mem::replace(&mut node.denied_region, region.clone());
            (previous, node.connections.iter().cloned().collect::<Vec<_>>())
        };

        let mut activity_changes = Vec::new();
        for neighbor in neighbors {
            if let Some((was_active, active)) = self.refresh_link(id, &neighbor) {
                if was_active != active {
                    activity_changes.push((id.to_string(), neighbor, active));
                }
            }
        }

        Ok(NodeUpdate {
            previous_region,
            region,
            activity_changes,
        })
    }

    /// Create or refresh the link between two nodes, in both directions.
    ///
    /// Distance and delay come from the current positions. The crossing is
    /// only evaluated when both endpoints have geographic coordinates;
    /// otherwise the link counts as non-crossing. An existing link keeps its
    /// bandwidth unless a new one is given, and keeps any external assessment
    /// and predictive window.
    pub fn add_or_update_edge(&mut self, from: &str, to: &str, kind: EdgeKind, bandwidth: Option<f64>) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfLoop(from.to_string()));
        }
        let geometry = self.link_geometry(from, to)?;

        let existing = self.get_edge(from, to).cloned();
        let compliant = existing.as_ref().map(|e| e.compliant).unwrap_or(true);
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            distance: geometry.distance_m,
            delay: propagation_delay_ms(geometry.distance_m),
            bandwidth: bandwidth.or(existing.as_ref().map(|e| e.bandwidth)).unwrap_or(self.default_bandwidth),
            active: !geometry.crossing.blocks_transmission && compliant,
            crossing: geometry.crossing,
            compliant,
            attenuation_db: existing.as_ref().and_then(|e| e.attenuation_db),
            predictive: existing.and_then(|e| e.predictive),
        };
        let reverse = Edge {
            from: to.to_string(),
            to: from.to_string(),
            ..edge.clone()
        };

        self.edges.entry(from.to_string()).or_default().insert(to.to_string(), edge);
        self.edges.entry(to.to_string()).or_default().insert(from.to_string(), reverse);

        if let Some(node) = self.nodes.get_mut(from) {
            node.connections.insert(to.to_string());
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.connections.insert(from.to_string());
        }
        Ok(())
    }

    /// Drop the link in both directions. Returns whether it existed.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        let forward = self.edges.get_mut(from).and_then(|m| m.remove(to)).is_some();
        let backward = self.edges.get_mut(to).and_then(|m| m.remove(from)).is_some();
        if let Some(node) = self.nodes.get_mut(from) {
            node.connections.remove(to);
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.connections.remove(from);
        }
        forward || backward
    }

    /// Remove a node together with every link touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        for neighbor in &node.connections {
            if let Some(m) = self.edges.get_mut(neighbor) {
                m.remove(id);
            }
            if let Some(other) = self.nodes.get_mut(neighbor) {
                other.connections.remove(id);
            }
        }
        self.edges.remove(id);
        Some(node)
    }

    /// Apply an external RF/regulatory verdict to both directions of a link.
    ///
    /// A non-compliant link is inactive regardless of geography.
    pub fn apply_link_assessment(&mut self, from: &str, to: &str, assessment: &LinkAssessment) -> Result<bool, GraphError> {
        let blocked = match self.get_edge(from, to) {
            Some(edge) => edge.crossing.blocks_transmission,
            None => return Err(GraphError::UnknownEdge(from.to_string(), to.to_string())),
        };

        let mut changed = false;
        for (a, b) in [(from, to), (to, from)] {
            if let Some(edge) = self.edges.get_mut(a).and_then(|m| m.get_mut(b)) {
                let active = !blocked && assessment.compliant;
                changed |= edge.active != active;
                edge.compliant = assessment.compliant;
                edge.attenuation_db = assessment.attenuation_db;
                if let Some(bandwidth) = assessment.bandwidth {
                    edge.bandwidth = bandwidth;
                }
                edge.active = active;
            }
        }
        Ok(changed)
    }

    /// Attach (or clear) a predictive availability window on both directions of a link.
    pub fn set_predictive_window(&mut self, from: &str, to: &str, window: Option<PredictiveWindow>) -> Result<(), GraphError> {
        if self.get_edge(from, to).is_none() {
            return Err(GraphError::UnknownEdge(from.to_string(), to.to_string()));
        }
        for (a, b) in [(from, to), (to, from)] {
            if let Some(edge) = self.edges.get_mut(a).and_then(|m| m.get_mut(b)) {
                edge.predictive = window.clone();
            }
        }
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, from: &str, to: &str) -> Option<&Edge> {
        self.edges.get(from).and_then(|m| m.get(to))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Every directed edge record.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values().flat_map(|m| m.values())
    }

    /// Outgoing edges of a node, ordered by neighbor id.
    pub fn outgoing_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.edges.get(id).into_iter().flat_map(|m| m.values())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of directed edge records (two per link).
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|m| m.len()).sum()
    }

    /// Independent copy for readers that must not observe later mutations.
    pub fn snapshot(&self) -> NetworkGraph {
        self.clone()
    }

    fn region_at(&self, geo: Option<&GeoPosition>) -> Option<String> {
        geo.and_then(|g| self.regions.is_point_in_region(g.lat, g.lon).region_name)
    }

    /// Geometry of the link between two nodes. The ground track is always
    /// walked from the endpoint with the smaller id, so both directions and
    /// both update orders see the same crossing.
    fn link_geometry(&self, from: &str, to: &str) -> Result<LinkGeometry, GraphError> {
        let a = self.nodes.get(from).ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;
        let b = self.nodes.get(to).ok_or_else(|| GraphError::UnknownNode(to.to_string()))?;
        let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };

        let distance_m = a.position.distance_to(&b.position) * 1000.0;
        let crossing = match (&first.geo, &second.geo) {
            (Some(g1), Some(g2)) => {
                let hit = self.regions.does_segment_cross_region(g1.lat, g1.lon, g2.lat, g2.lon);
                let blocks_transmission = hit.crosses
                    && self
                        .regions
                        .regions_crossed_by_segment(g1.lat, g1.lon, g2.lat, g2.lon)
                        .into_iter()
                        .filter_map(|name| self.regions.get_region_constraints(name))
                        .any(|c| c.no_transmission);
                Crossing {
                    is_denied_region: hit.crosses,
                    region_name: hit.region_name,
                    blocks_transmission,
                }
            }
            _ => Crossing::default(),
        };
        Ok(LinkGeometry { distance_m, crossing })
    }

    /// Recompute an existing link from current endpoint state.
    /// Returns (was active, now active) or `None` if the link does not exist.
    fn refresh_link(&mut self, a: &str, b: &str) -> Option<(bool, bool)> {
        let geometry = self.link_geometry(a, b).ok()?;
        let delay = propagation_delay_ms(geometry.distance_m);
        let mut result = None;
        for (from, to) in [(a, b), (b, a)] {
            if let Some(edge) = self.edges.get_mut(from).and_then(|m| m.get_mut(to)) {
                let was_active = edge.active;
                edge.distance = geometry.distance_m;
                edge.delay = delay;
                edge.crossing = geometry.crossing.clone();
                edge.active = !geometry.crossing.blocks_transmission && edge.compliant;
                result.get_or_insert((was_active, edge.active));
            }
        }
        result
    }
}
