//! Routing task driving the controller from the command channel and the tick timer.
//!
//! Each loop iteration:
//! 1) `select` waits for an inbound command or the next tick deadline.
//! 2) Commands are applied one at a time, in arrival order.
//! 3) On a tick, ground links are refreshed and every flow is re-routed
//!    against the current graph; a `TickCompleted` event closes the tick.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

use super::controller::RoutingController;
use super::events::{RoutingCommand, RoutingCommandReceiver, RoutingEvent, RoutingEventSender};
use crate::time_driver;

/// Wall-clock epoch milliseconds advanced by (possibly warped) embassy time.
/// Shared by every task that needs to agree on "now".
#[derive(Debug, Clone, Copy)]
pub struct RoutingClock {
    epoch_ms: i64,
    origin: Instant,
}

impl RoutingClock {
    pub fn start() -> Self {
        Self {
            epoch_ms: chrono::Utc::now().timestamp_millis(),
            origin: Instant::now(),
        }
    }

    /// Epoch milliseconds at which the clock started.
    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    pub fn now_ms(&self) -> i64 {
        self.epoch_ms + Instant::now().duration_since(self.origin).as_millis() as i64
    }

    /// Embassy instant `offset_s` seconds after the clock started.
    pub fn instant_at(&self, offset_s: f64) -> Instant {
        self.origin + Duration::from_micros((offset_s.max(0.0) * 1_000_000.0) as u64)
    }
}

#[embassy_executor::task]
pub async fn routing_task(
    controller: RoutingController,
    clock: RoutingClock,
    tick_interval: Duration,
    command_rx: RoutingCommandReceiver,
    event_tx: RoutingEventSender,
) {
    let mut controller = controller;
    let mut tick: u64 = 0;
    let mut next_tick = Instant::now() + tick_interval;
    let mut lag_warning_issued = false;

    log::info!(
        "Routing task started: {} nodes, {} links, tick every {} ms",
        controller.graph().node_count(),
        controller.graph().edge_count(),
        tick_interval.as_millis()
    );

    loop {
        match select(command_rx.receive(), Timer::at(next_tick)).await {
            Either::First(command) => {
                for event in handle_command(&mut controller, command, clock.now_ms()) {
                    publish(&event_tx, event);
                }
            }
            Either::Second(()) => {
                let started = Instant::now();
                let refresh = controller.refresh_ground_links();
                if refresh.added > 0 || refresh.removed > 0 {
                    log::debug!("Ground links: {} added, {} removed", refresh.added, refresh.removed);
                }
                for event in controller.recompute_flows(clock.now_ms()) {
                    publish(&event_tx, event);
                }

                tick += 1;
                publish(
                    &event_tx,
                    RoutingEvent::TickCompleted {
                        tick,
                        nodes: controller.graph().node_count(),
                        edges: controller.graph().edge_count(),
                        elapsed: Instant::now().duration_since(started),
                    },
                );

                next_tick += tick_interval;
                let now = Instant::now();
                if next_tick < now {
                    // Skip missed ticks instead of bursting to catch up
                    if !lag_warning_issued {
                        log::warn!("Routing tick {} overran its deadline by {} ms", tick, now.duration_since(next_tick).as_millis());
                        lag_warning_issued = true;
                    }
                    next_tick = now + tick_interval;
                } else {
                    lag_warning_issued = false;
                }
            }
        }
    }
}

/// Apply a single command and collect the events it produced.
pub fn handle_command(controller: &mut RoutingController, command: RoutingCommand, now_ms: i64) -> Vec<RoutingEvent> {
    match command {
        RoutingCommand::UpdateNodePosition { id, position, geo } => controller.update_node_position(&id, position, geo),
        RoutingCommand::AddSatellite { id, position, geo } => {
            controller.add_satellite(&id, position, geo);
            Vec::new()
        }
        RoutingCommand::AddGroundStation { id, geo } => {
            controller.add_ground_station(&id, geo);
            Vec::new()
        }
        RoutingCommand::Connect { from, to, kind, bandwidth } => {
            controller.connect(&from, &to, kind, bandwidth);
            Vec::new()
        }
        RoutingCommand::AssessLink { from, to, assessment } => controller.assess_link(&from, &to, &assessment),
        RoutingCommand::PredictEdgeWindow { from, to, window } => {
            controller.predict_edge_window(&from, &to, window);
            Vec::new()
        }
        RoutingCommand::RemoveNode(id) => {
            if !controller.remove_node(&id) {
                log::debug!("RemoveNode for unknown node {}", id);
            }
            Vec::new()
        }
        RoutingCommand::RegisterFlow(spec) => {
            let flow_id = controller.register_flow(spec);
            log::info!("Registered flow {}", flow_id);
            Vec::new()
        }
        RoutingCommand::RemoveFlow(flow_id) => {
            if !controller.remove_flow(flow_id) {
                log::warn!("RemoveFlow for unknown flow {}", flow_id);
            }
            Vec::new()
        }
        RoutingCommand::RequestPath { source, destination, options } => {
            let paths = match options {
                Some(options) => controller.query_path(&source, &destination, &options, now_ms).into_iter().collect(),
                None => controller.query_all_paths(&source, &destination, now_ms),
            };
            if paths.is_empty() {
                vec![
                    RoutingEvent::Alert(format!("No path from {} to {}", source, destination)),
                    RoutingEvent::PathResult { source, destination, paths },
                ]
            } else {
                vec![RoutingEvent::PathResult { source, destination, paths }]
            }
        }
        RoutingCommand::SetTimeWarp(percent) => {
            time_driver::set_time_warp_percent(percent);
            vec![RoutingEvent::TimeWarpChanged(time_driver::get_time_warp_percent())]
        }
        RoutingCommand::ReportNetwork => vec![RoutingEvent::NetworkSnapshot(Box::new(controller.graph().snapshot()))],
    }
}

fn publish(event_tx: &RoutingEventSender, event: RoutingEvent) {
    if let Err(embassy_sync::channel::TrySendError::Full(event)) = event_tx.try_send(event) {
        log::warn!("Routing event channel full, dropping {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::controller::{ControllerSettings, FlowSpec};
    use crate::routing::regions::{CrossingMode, GeoRegionIndex};
    use crate::routing::types::{EdgeKind, GeoPosition, LinkAssessment, OptimizeFor, PathOptions, PredictiveWindow};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn controller() -> RoutingController {
        RoutingController::new(Arc::new(GeoRegionIndex::new(CrossingMode::Sampled)), ControllerSettings::default())
    }

    fn add_satellite(id: &str, lat: f64, lon: f64) -> RoutingCommand {
        let geo = GeoPosition::new(lat, lon, 550.0);
        RoutingCommand::AddSatellite {
            id: id.to_string(),
            position: geo.to_ecef(),
            geo: Some(geo),
        }
    }

    #[test]
    fn commands_build_graph_and_answer_queries() {
        let mut controller = controller();
        for command in [
            add_satellite("a", 10.0, 10.0),
            add_satellite("b", 10.0, 20.0),
            RoutingCommand::Connect {
                from: "a".into(),
                to: "b".into(),
                kind: EdgeKind::InterSatellite,
                bandwidth: Some(500.0),
            },
        ] {
            assert!(handle_command(&mut controller, command, NOW).is_empty());
        }
        assert_eq!(controller.graph().edge_count(), 2);

        let events = handle_command(
            &mut controller,
            RoutingCommand::RequestPath {
                source: "a".into(),
                destination: "b".into(),
                options: None,
            },
            NOW,
        );
        match &events[..] {
            [RoutingEvent::PathResult { paths, .. }] => {
                assert_eq!(paths.len(), 1);
                assert_eq!(paths[0].edges[0].bandwidth, 500.0);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn missing_route_raises_alert() {
        let mut controller = controller();
        handle_command(&mut controller, add_satellite("a", 10.0, 10.0), NOW);
        let events = handle_command(
            &mut controller,
            RoutingCommand::RequestPath {
                source: "a".into(),
                destination: "nowhere".into(),
                options: None,
            },
            NOW,
        );
        assert!(matches!(events[0], RoutingEvent::Alert(_)));
        assert!(matches!(&events[1], RoutingEvent::PathResult { paths, .. } if paths.is_empty()));
    }

    #[test]
    fn flows_and_removals() {
        let mut controller = controller();
        handle_command(&mut controller, add_satellite("a", 10.0, 10.0), NOW);
        handle_command(&mut controller, add_satellite("b", 10.0, 20.0), NOW);
        handle_command(
            &mut controller,
            RoutingCommand::Connect {
                from: "a".into(),
                to: "b".into(),
                kind: EdgeKind::InterSatellite,
                bandwidth: None,
            },
            NOW,
        );
        handle_command(
            &mut controller,
            RoutingCommand::RegisterFlow(FlowSpec {
                source: "a".into(),
                destination: "b".into(),
                optimize_for: OptimizeFor::Delay,
                avoid_denied_regions: true,
            }),
            NOW,
        );
        assert_eq!(controller.flows().count(), 1);

        handle_command(&mut controller, RoutingCommand::RemoveNode("b".into()), NOW);
        assert_eq!(controller.graph().edge_count(), 0);
        let events = controller.recompute_flows(NOW);
        assert!(matches!(&events[..], [RoutingEvent::PathUpdated { path: None, .. }]));

        handle_command(&mut controller, RoutingCommand::RemoveFlow(1), NOW);
        assert_eq!(controller.flows().count(), 0);
    }

    fn connect(from: &str, to: &str) -> RoutingCommand {
        RoutingCommand::Connect {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::InterSatellite,
            bandwidth: None,
        }
    }

    fn triangle() -> RoutingController {
        let mut controller = controller();
        for command in [
            add_satellite("a", 10.0, 10.0),
            add_satellite("b", 10.0, 20.0),
            add_satellite("c", 20.0, 15.0),
            connect("a", "b"),
            connect("a", "c"),
            connect("c", "b"),
        ] {
            handle_command(&mut controller, command, NOW);
        }
        controller
    }

    #[test]
    fn request_with_options_returns_single_best_path() {
        let mut controller = triangle();
        let events = handle_command(
            &mut controller,
            RoutingCommand::RequestPath {
                source: "a".into(),
                destination: "b".into(),
                options: Some(PathOptions {
                    optimize_for: OptimizeFor::Distance,
                    ..Default::default()
                }),
            },
            NOW,
        );
        match &events[..] {
            [RoutingEvent::PathResult { paths, .. }] => {
                assert_eq!(paths.len(), 1);
                assert_eq!(paths[0].id, "a->b");
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn assessment_and_outage_commands_change_routes() {
        let mut controller = triangle();
        let events = handle_command(
            &mut controller,
            RoutingCommand::AssessLink {
                from: "a".into(),
                to: "b".into(),
                assessment: LinkAssessment {
                    compliant: false,
                    attenuation_db: Some(30.0),
                    bandwidth: None,
                },
            },
            NOW,
        );
        assert!(!events.is_empty());
        assert!(!controller.graph().get_edge("b", "a").unwrap().active);
        let best = controller.query_path("a", "b", &PathOptions::default(), NOW).unwrap();
        assert_eq!(best.id, "a->c->b");

        handle_command(
            &mut controller,
            RoutingCommand::PredictEdgeWindow {
                from: "c".into(),
                to: "b".into(),
                window: Some(PredictiveWindow {
                    available_at: NOW + 60_000,
                    unavailable_at: NOW,
                    reason: "handover".into(),
                }),
            },
            NOW,
        );
        assert!(controller.query_path("a", "b", &PathOptions::default(), NOW).is_none());
        assert!(controller.query_path("a", "b", &PathOptions::default(), NOW + 60_000).is_some());
    }

    #[test]
    fn report_network_returns_independent_snapshot() {
        let mut controller = triangle();
        let events = handle_command(&mut controller, RoutingCommand::ReportNetwork, NOW);
        let snapshot = match events.into_iter().next() {
            Some(RoutingEvent::NetworkSnapshot(graph)) => graph,
            other => panic!("unexpected event {:?}", other),
        };
        handle_command(&mut controller, RoutingCommand::RemoveNode("c".into()), NOW);
        assert_eq!(snapshot.node_count(), 3);
        assert_eq!(snapshot.edge_count(), 6);
        assert_eq!(controller.graph().node_count(), 2);
        assert!(snapshot.edges().all(|e| e.active));
        assert!(snapshot.nodes().all(|n| !n.in_denied_region()));
    }
}
