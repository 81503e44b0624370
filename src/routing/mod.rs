//! Constellation routing core.
//!
//! - `regions`: denied-region polygons and point/segment queries.
//! - `graph`: satellites, ground stations and the links between them, with
//!   per-link distance, delay and region crossing kept current as nodes move.
//! - `pathfinding`: shortest, alternate and predictive paths over a graph.
//! - `controller`: owns the graph and keeps registered flows routed.
//! - `routing_task`: the embassy task feeding commands and ticks to the controller.

pub mod controller;
pub mod events;
pub mod geometry;
pub mod graph;
pub mod pathfinding;
pub mod regions;
pub mod routing_task;
pub mod types;

pub use controller::RoutingController;
pub use events::RoutingEvent;
pub use regions::GeoRegionIndex;
pub use types::EdgeKind;
