//! Shortest-path queries over a graph snapshot.
//!
//! Every function here is pure: it borrows the graph immutably, never
//! mutates it, and answers "no route" with `None` or an empty list rather
//! than an error. That makes speculative "what if" queries safe to run at
//! any time.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::graph::NetworkGraph;
use super::types::{Edge, NetworkPath, OptimizeFor, PathOptions};

/// Offsets (seconds) previewed by `calculate_predictive_paths` when the caller has no preference.
pub const DEFAULT_PREDICTIVE_OFFSETS: [u32; 5] = [60, 120, 180, 240, 300];

/// Look-ahead used by the third `find_all_paths` variant.
const ALTERNATE_LOOKAHEAD_SECONDS: f64 = 300.0;

/// Heap entry ordered so that `BinaryHeap` pops the cheapest node first.
/// Ties fall back to node id so results never depend on hash order.
#[derive(Debug)]
struct QueueEntry<'a> {
    cost: f64,
    node: &'a str,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry<'_> {}

impl Ord for QueueEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(self.node))
    }
}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Whether Dijkstra may traverse `edge` under `options` at `future_time_ms`.
fn is_traversable(edge: &Edge, options: &PathOptions, future_time_ms: i64) -> bool {
    if !edge.active {
        return false;
    }
    if options.avoid_denied_regions && edge.crossing.is_denied_region {
        return false;
    }
    if let Some(window) = &edge.predictive {
        if window.is_unavailable_at(future_time_ms) {
            return false;
        }
    }
    true
}

fn edge_weight(edge: &Edge, optimize_for: OptimizeFor) -> f64 {
    match optimize_for {
        OptimizeFor::Delay => edge.delay,
        OptimizeFor::Distance => edge.distance,
    }
}

/// Dijkstra shortest path from `source` to `destination`.
///
/// Edges are skipped when inactive, when `avoid_denied_regions` is set and
/// the edge crosses a denied region, or when the edge's predictive window
/// marks it unavailable at `now_ms + time_offset_seconds * 1000`. Weights are
/// link delay or link distance depending on `optimize_for`.
///
/// # Parameters
///
/// * `graph` - Snapshot to search
/// * `source` - Start node id
/// * `destination` - Target node id
/// * `options` - Weighting, denied-region avoidance and time offset
/// * `now_ms` - Reference time in epoch milliseconds for predictive windows
///
/// # Returns
///
/// `None` if either id is unknown or the destination is unreachable under
/// the constraints. A query from a node to itself yields a single-node path
/// with zero totals.
pub fn find_shortest_path(graph: &NetworkGraph, source: &str, destination: &str, options: &PathOptions, now_ms: i64) -> Option<NetworkPath> {
    let source_node = graph.get_node(source)?;
    graph.get_node(destination)?;

    // Float to int casts saturate, so any offset lands within i64 range
    let offset_ms = (options.time_offset_seconds * 1000.0) as i64;
    let future_time_ms = now_ms.saturating_add(offset_ms);

    let mut distances: HashMap<&str, f64> = HashMap::new();
    let mut previous: HashMap<&str, &Edge> = HashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source_node.id.as_str(), 0.0);
    heap.push(QueueEntry {
        cost: 0.0,
        node: source_node.id.as_str(),
    });

    while let Some(QueueEntry { cost, node }) = heap.pop() {
        if node == destination {
            break;
        }
        // Stale entry left behind by a later relaxation
        if distances.get(node).is_some_and(|&best| cost > best) {
            continue;
        }

        for edge in graph.outgoing_edges(node) {
            if !is_traversable(edge, options, future_time_ms) {
                continue;
            }
            let candidate = cost + edge_weight(edge, options.optimize_for);
            let neighbor = edge.to.as_str();
            if distances.get(neighbor).is_none_or(|&best| candidate < best) {
                distances.insert(neighbor, candidate);
                previous.insert(neighbor, edge);
                heap.push(QueueEntry { cost: candidate, node: neighbor });
            }
        }
    }

    if source != destination && !previous.contains_key(destination) {
        return None;
    }

    let mut edges: Vec<Edge> = Vec::new();
    let mut current = destination;
    while current != source {
        let edge = previous.get(current)?;
        edges.push((*edge).clone());
        current = edge.from.as_str();
    }
    edges.reverse();

    Some(build_path(source, edges))
}

/// Assemble totals and denied-region bookkeeping for a traversed edge list.
fn build_path(source: &str, edges: Vec<Edge>) -> NetworkPath {
    let mut nodes = Vec::with_capacity(edges.len() + 1);
    nodes.push(source.to_string());
    nodes.extend(edges.iter().map(|e| e.to.clone()));

    let mut denied_regions: Vec<String> = Vec::new();
    for edge in &edges {
        if let Some(region) = edge.crossing.region_name.as_ref().filter(|_| edge.crossing.is_denied_region) {
            if !denied_regions.contains(region) {
                denied_regions.push(region.clone());
            }
        }
    }

    NetworkPath {
        id: nodes.join("->"),
        total_delay: edges.iter().map(|e| e.delay).sum(),
        total_distance: edges.iter().map(|e| e.distance).sum(),
        crosses_denied_region: edges.iter().any(|e| e.crossing.is_denied_region),
        denied_regions,
        is_active: edges.iter().all(|e| e.active),
        nodes,
        edges,
    }
}

/// A small, diverse set of alternative routes.
///
/// Runs the shortest-path search with (delay, avoiding denied regions),
/// (distance, not avoiding), and (delay, avoiding, 300 s ahead) in that order
/// and keeps the distinct results. The first entry is the default route; the
/// rest are alternates with no ranking guarantee.
pub fn find_all_paths(graph: &NetworkGraph, source: &str, destination: &str, max_paths: usize, now_ms: i64) -> Vec<NetworkPath> {
    let variants = [
        PathOptions {
            optimize_for: OptimizeFor::Delay,
            avoid_denied_regions: true,
            time_offset_seconds: 0.0,
        },
        PathOptions {
            optimize_for: OptimizeFor::Distance,
            avoid_denied_regions: false,
            time_offset_seconds: 0.0,
        },
        PathOptions {
            optimize_for: OptimizeFor::Delay,
            avoid_denied_regions: true,
            time_offset_seconds: ALTERNATE_LOOKAHEAD_SECONDS,
        },
    ];

    let mut paths: Vec<NetworkPath> = Vec::new();
    for options in &variants {
        if paths.len() >= max_paths {
            break;
        }
        if let Some(path) = find_shortest_path(graph, source, destination, options, now_ms) {
            if !paths.iter().any(|p| p.id == path.id) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Preview how the default route evolves over the given offsets (seconds).
///
/// Each result's id is tagged with its offset (`...@+60s`). Offsets where no
/// route exists are left out.
pub fn calculate_predictive_paths(graph: &NetworkGraph, source: &str, destination: &str, offsets: &[u32], now_ms: i64) -> Vec<NetworkPath> {
    offsets
        .iter()
        .filter_map(|&offset| {
            let options = PathOptions {
                optimize_for: OptimizeFor::Delay,
                avoid_denied_regions: true,
                time_offset_seconds: offset as f64,
            };
            find_shortest_path(graph, source, destination, &options, now_ms).map(|mut path| {
                path.id = format!("{}@+{}s", path.id, offset);
                path
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::regions::{CrossingMode, GeoRegionIndex, RegionConstraints, RegionDefinition};
    use crate::routing::types::{EdgeKind, GeoPosition, NodeKind, PredictiveWindow, Vec3};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn empty_graph() -> NetworkGraph {
        NetworkGraph::new(Arc::new(GeoRegionIndex::new(CrossingMode::Sampled)), 1000.0)
    }

    fn restricted_graph() -> NetworkGraph {
        let index = GeoRegionIndex::from_definitions(
            vec![RegionDefinition {
                name: "restricted".into(),
                polygon: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)],
                constraints: RegionConstraints {
                    no_transmission: true,
                    ..Default::default()
                },
            }],
            CrossingMode::Sampled,
        )
        .unwrap();
        NetworkGraph::new(Arc::new(index), 1000.0)
    }

    fn sat(graph: &mut NetworkGraph, id: &str, x: f64, y: f64) {
        graph.add_node(id, NodeKind::Satellite, Vec3::new(x, y, 0.0), None).unwrap();
    }

    fn link(graph: &mut NetworkGraph, a: &str, b: &str) {
        graph.add_or_update_edge(a, b, EdgeKind::InterSatellite, None).unwrap();
    }

    fn options(optimize_for: OptimizeFor, avoid: bool) -> PathOptions {
        PathOptions {
            optimize_for,
            avoid_denied_regions: avoid,
            time_offset_seconds: 0.0,
        }
    }

    #[test]
    fn direct_link_between_two_satellites() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 7000.0, 0.0);
        sat(&mut graph, "b", 7000.0, 1000.0);
        link(&mut graph, "a", "b");

        let path = find_shortest_path(&graph, "a", "b", &PathOptions::default(), NOW).unwrap();
        assert_eq!(path.nodes, vec!["a", "b"]);
        assert_eq!(path.hop_count(), 1);
        assert!((path.total_delay - 3.3356).abs() < 1e-3, "delay {}", path.total_delay);
        assert!((path.total_distance - 1_000_000.0).abs() < 1e-6);
        assert!(path.is_active);
        assert!(!path.crosses_denied_region);
    }

    #[test]
    fn chain_goes_through_middle_node() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "b", 300.0, 400.0);
        sat(&mut graph, "c", 600.0, 0.0);
        link(&mut graph, "a", "b");
        link(&mut graph, "b", "c");

        let path = find_shortest_path(&graph, "a", "c", &options(OptimizeFor::Distance, true), NOW).unwrap();
        assert_eq!(path.nodes, vec!["a", "b", "c"]);
        let expected = graph.get_edge("a", "b").unwrap().distance + graph.get_edge("b", "c").unwrap().distance;
        assert!((path.total_distance - expected).abs() < 1e-6);
        assert_eq!(path.id, "a->b->c");
    }

    #[test]
    fn picks_cheaper_of_two_routes() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "near", 500.0, 10.0);
        sat(&mut graph, "far", 500.0, 3000.0);
        sat(&mut graph, "z", 1000.0, 0.0);
        for (x, y) in [("a", "near"), ("near", "z"), ("a", "far"), ("far", "z")] {
            link(&mut graph, x, y);
        }
        let path = find_shortest_path(&graph, "a", "z", &PathOptions::default(), NOW).unwrap();
        assert_eq!(path.nodes, vec!["a", "near", "z"]);
    }

    #[test]
    fn self_path_is_trivial() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        let path = find_shortest_path(&graph, "a", "a", &PathOptions::default(), NOW).unwrap();
        assert_eq!(path.nodes, vec!["a"]);
        assert!(path.edges.is_empty());
        assert_eq!(path.total_delay, 0.0);
        assert_eq!(path.total_distance, 0.0);
        assert!(path.is_active);
    }

    #[test]
    fn unknown_ids_and_isolated_nodes_yield_none() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "b", 10.0, 0.0);
        link(&mut graph, "a", "b");
        assert!(find_shortest_path(&graph, "a", "ghost", &PathOptions::default(), NOW).is_none());
        assert!(find_shortest_path(&graph, "ghost", "a", &PathOptions::default(), NOW).is_none());

        graph.remove_edge("a", "b");
        assert!(find_shortest_path(&graph, "a", "b", &PathOptions::default(), NOW).is_none());
        assert!(find_shortest_path(&graph, "b", "a", &PathOptions::default(), NOW).is_none());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "b1", 100.0, 100.0);
        sat(&mut graph, "b2", 100.0, -100.0);
        sat(&mut graph, "c", 200.0, 0.0);
        for (x, y) in [("a", "b1"), ("b1", "c"), ("a", "b2"), ("b2", "c")] {
            link(&mut graph, x, y);
        }
        let first = find_shortest_path(&graph, "a", "c", &PathOptions::default(), NOW).unwrap();
        let second = find_shortest_path(&graph, "a", "c", &PathOptions::default(), NOW).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.total_delay, second.total_delay);
        // Equal cost routes resolve by node id
        assert_eq!(first.nodes, vec!["a", "b1", "c"]);
    }

    #[test]
    fn no_transmission_station_is_unreachable() {
        let mut graph = restricted_graph();
        let gs = GeoPosition::new(5.0, 5.0, 0.0);
        let sat_geo = GeoPosition::new(20.0, 20.0, 550.0);
        graph.add_node("gs", NodeKind::GroundStation, gs.to_ecef(), Some(gs)).unwrap();
        graph.add_node("sat", NodeKind::Satellite, sat_geo.to_ecef(), Some(sat_geo)).unwrap();
        graph.add_or_update_edge("gs", "sat", EdgeKind::GroundLink, None).unwrap();

        assert!(!graph.get_edge("gs", "sat").unwrap().active);
        assert!(find_shortest_path(&graph, "gs", "sat", &options(OptimizeFor::Delay, true), NOW).is_none());
        // Inactive edges are skipped whatever the avoidance flag says
        assert!(find_shortest_path(&graph, "gs", "sat", &options(OptimizeFor::Delay, false), NOW).is_none());
    }

    #[test]
    fn avoidance_flag_controls_crossing_edges() {
        let index = GeoRegionIndex::from_definitions(
            vec![RegionDefinition {
                name: "overflight".into(),
                polygon: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)],
                constraints: RegionConstraints {
                    no_overflight: true,
                    ..Default::default()
                },
            }],
            CrossingMode::Sampled,
        )
        .unwrap();
        let mut graph = NetworkGraph::new(Arc::new(index), 1000.0);
        let places = [("west", 5.0, -10.0), ("east", 5.0, 20.0), ("north", 30.0, 5.0)];
        for (id, lat, lon) in places {
            let geo = GeoPosition::new(lat, lon, 550.0);
            graph.add_node(id, NodeKind::Satellite, geo.to_ecef(), Some(geo)).unwrap();
        }
        link(&mut graph, "west", "east");
        link(&mut graph, "west", "north");
        link(&mut graph, "north", "east");
        assert!(graph.get_edge("west", "east").unwrap().crossing.is_denied_region);

        let direct = find_shortest_path(&graph, "west", "east", &options(OptimizeFor::Delay, false), NOW).unwrap();
        assert_eq!(direct.nodes, vec!["west", "east"]);
        assert!(direct.crosses_denied_region);
        assert_eq!(direct.denied_regions, vec!["overflight"]);
        assert!(direct.is_active);

        let around = find_shortest_path(&graph, "west", "east", &options(OptimizeFor::Delay, true), NOW).unwrap();
        assert_eq!(around.nodes, vec!["west", "north", "east"]);
        assert!(!around.crosses_denied_region);
        assert!(around.edges.iter().all(|e| !e.crossing.is_denied_region));
    }

    #[test]
    fn predictive_window_blocks_only_inside_outage() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "b", 100.0, 0.0);
        link(&mut graph, "a", "b");
        graph
            .set_predictive_window(
                "a",
                "b",
                Some(PredictiveWindow {
                    available_at: NOW + 200_000,
                    unavailable_at: NOW + 100_000,
                    reason: "earth occultation".into(),
                }),
            )
            .unwrap();

        let at = |offset: f64| PathOptions {
            time_offset_seconds: offset,
            ..PathOptions::default()
        };
        assert!(find_shortest_path(&graph, "a", "b", &at(0.0), NOW).is_some());
        assert!(find_shortest_path(&graph, "a", "b", &at(150.0), NOW).is_none());
        assert!(find_shortest_path(&graph, "a", "b", &at(250.0), NOW).is_some());

        let previews = calculate_predictive_paths(&graph, "a", "b", &DEFAULT_PREDICTIVE_OFFSETS, NOW);
        let ids: Vec<&str> = previews.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a->b@+60s", "a->b@+240s", "a->b@+300s"]);
    }

    #[test]
    fn all_paths_on_single_route_collapses_to_one() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 0.0, 0.0);
        sat(&mut graph, "b", 100.0, 0.0);
        sat(&mut graph, "c", 200.0, 0.0);
        link(&mut graph, "a", "b");
        link(&mut graph, "b", "c");
        let paths = find_all_paths(&graph, "a", "c", 3, NOW);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec!["a", "b", "c"]);
        assert!(find_all_paths(&graph, "a", "ghost", 3, NOW).is_empty());
        assert!(find_all_paths(&graph, "a", "c", 0, NOW).is_empty());
    }

    #[test]
    fn all_paths_includes_distance_variant_through_denied_region() {
        let index = GeoRegionIndex::from_definitions(
            vec![RegionDefinition {
                name: "zone".into(),
                polygon: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)],
                constraints: RegionConstraints::default(),
            }],
            CrossingMode::Sampled,
        )
        .unwrap();
        let mut graph = NetworkGraph::new(Arc::new(index), 1000.0);
        for (id, lat, lon) in [("west", 5.0, -10.0), ("east", 5.0, 20.0), ("north", 30.0, 5.0)] {
            let geo = GeoPosition::new(lat, lon, 550.0);
            graph.add_node(id, NodeKind::Satellite, geo.to_ecef(), Some(geo)).unwrap();
        }
        link(&mut graph, "west", "east");
        link(&mut graph, "west", "north");
        link(&mut graph, "north", "east");

        let paths = find_all_paths(&graph, "west", "east", 3, NOW);
        let ids: Vec<&str> = paths.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["west->north->east", "west->east"]);
        assert_eq!(find_all_paths(&graph, "west", "east", 1, NOW).len(), 1);
    }

    #[test]
    fn huge_time_offset_saturates_instead_of_overflowing() {
        let mut graph = empty_graph();
        sat(&mut graph, "a", 7000.0, 0.0);
        sat(&mut graph, "b", 7000.0, 500.0);
        link(&mut graph, "a", "b");
        graph
            .set_predictive_window(
                "a",
                "b",
                Some(PredictiveWindow {
                    available_at: NOW + 60_000,
                    unavailable_at: NOW,
                    reason: "eclipse".into(),
                }),
            )
            .unwrap();

        for offset in [1e18, -1e18, f64::INFINITY] {
            let opts = PathOptions {
                time_offset_seconds: offset,
                ..options(OptimizeFor::Delay, true)
            };
            let path = find_shortest_path(&graph, "a", "b", &opts, NOW);
            assert_eq!(path.map(|p| p.id), Some("a->b".to_string()), "offset {}", offset);
        }
    }
}
