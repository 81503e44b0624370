//! Messages exchanged with the routing task and the channels that carry them.
//!
//! Inbound `RoutingCommand`s come from the position feed and from whoever
//! manages the network (the scenario script in the binary). Outbound `RoutingEvent`s
//! go to consumers such as renderers or the console logger in `main`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;

use super::controller::{FlowId, FlowSpec};
use super::graph::NetworkGraph;
use super::types::{EdgeKind, GeoPosition, LinkAssessment, NetworkPath, PathOptions, PredictiveWindow, Vec3};

/// Depth of the inbound command channel. Sized for a full feed sweep of a
/// small constellation; the feed awaits when it is full.
pub const ROUTING_COMMAND_CHANNEL_SIZE: usize = 256;
pub type RoutingCommandChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, RoutingCommand, ROUTING_COMMAND_CHANNEL_SIZE>;
pub type RoutingCommandReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RoutingCommand, ROUTING_COMMAND_CHANNEL_SIZE>;
pub type RoutingCommandSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RoutingCommand, ROUTING_COMMAND_CHANNEL_SIZE>;

/// Depth of the outbound event channel. Events are dropped (with a warning)
/// when consumers fall behind.
pub const ROUTING_EVENT_CHANNEL_SIZE: usize = 100;
pub type RoutingEventChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, RoutingEvent, ROUTING_EVENT_CHANNEL_SIZE>;
pub type RoutingEventReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, RoutingEvent, ROUTING_EVENT_CHANNEL_SIZE>;
pub type RoutingEventSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, RoutingEvent, ROUTING_EVENT_CHANNEL_SIZE>;

#[derive(Debug, Clone)]
pub enum RoutingCommand {
    /// New position from the orbital feed.
    UpdateNodePosition { id: String, position: Vec3, geo: Option<GeoPosition> },
    AddSatellite { id: String, position: Vec3, geo: Option<GeoPosition> },
    AddGroundStation { id: String, geo: GeoPosition },
    Connect { from: String, to: String, kind: EdgeKind, bandwidth: Option<f64> },
    /// Verdict from the RF/regulatory engine.
    AssessLink { from: String, to: String, assessment: LinkAssessment },
    PredictEdgeWindow { from: String, to: String, window: Option<PredictiveWindow> },
    RemoveNode(String),
    RegisterFlow(FlowSpec),
    RemoveFlow(FlowId),
    /// One-off query answered with `RoutingEvent::PathResult`: the single best
    /// path under `options`, or every alternative when `options` is `None`.
    RequestPath { source: String, destination: String, options: Option<PathOptions> },
    /// Virtual clock speed in percent of real time.
    SetTimeWarp(u32),
    /// Answered with `RoutingEvent::NetworkSnapshot`.
    ReportNetwork,
}

#[derive(Debug, Clone)]
pub enum RoutingEvent {
    Alert(String),
    NodeRegionChanged { node_id: String, region: Option<String> },
    EdgeActivityChanged { from: String, to: String, active: bool },
    /// A flow's route changed; `None` means it is currently unroutable.
    PathUpdated { flow_id: FlowId, path: Option<NetworkPath> },
    PathResult { source: String, destination: String, paths: Vec<NetworkPath> },
    PredictivePaths { flow_id: FlowId, paths: Vec<NetworkPath> },
    TickCompleted { tick: u64, nodes: usize, edges: usize, elapsed: Duration },
    TimeWarpChanged(u32),
    /// Independent copy of the graph at the time of the request.
    NetworkSnapshot(Box<NetworkGraph>),
}
