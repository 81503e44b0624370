//! Scenario script: replays the scenario's timed actions into the routing task.

use embassy_time::Timer;

use crate::common::scenario::{ScenarioAction, ScheduledAction};
use crate::routing::events::{RoutingCommand, RoutingCommandSender};
use crate::routing::routing_task::RoutingClock;
use crate::routing::types::{GeoPosition, PredictiveWindow};

/// Actions in firing order. Actions sharing a time keep their file order.
pub fn ordered_actions(mut actions: Vec<ScheduledAction>) -> Vec<ScheduledAction> {
    actions.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
    actions
}

/// Command for one action. Outage times are relative to `epoch_ms`.
pub fn action_command(action: ScenarioAction, epoch_ms: i64) -> RoutingCommand {
    let at = |offset_s: f64| epoch_ms.saturating_add((offset_s * 1000.0) as i64);
    match action {
        ScenarioAction::AddSatellite { id, lat, lon, alt_km } => {
            let geo = GeoPosition::new(lat, lon, alt_km);
            RoutingCommand::AddSatellite {
                id,
                position: geo.to_ecef(),
                geo: Some(geo),
            }
        }
        ScenarioAction::AddGroundStation { id, lat, lon, alt_km } => RoutingCommand::AddGroundStation {
            id,
            geo: GeoPosition::new(lat, lon, alt_km),
        },
        ScenarioAction::Connect { from, to, kind, bandwidth } => RoutingCommand::Connect { from, to, kind, bandwidth },
        ScenarioAction::AssessLink { from, to, assessment } => RoutingCommand::AssessLink { from, to, assessment },
        ScenarioAction::PredictOutage { from, to, start_s, end_s, reason } => RoutingCommand::PredictEdgeWindow {
            from,
            to,
            window: Some(PredictiveWindow {
                available_at: at(end_s),
                unavailable_at: at(start_s),
                reason,
            }),
        },
        ScenarioAction::ClearPrediction { from, to } => RoutingCommand::PredictEdgeWindow { from, to, window: None },
        ScenarioAction::RemoveNode { id } => RoutingCommand::RemoveNode(id),
        ScenarioAction::RegisterFlow { flow } => RoutingCommand::RegisterFlow(flow),
        ScenarioAction::RemoveFlow { flow_id } => RoutingCommand::RemoveFlow(flow_id),
        ScenarioAction::RequestPath { source, destination, options } => RoutingCommand::RequestPath { source, destination, options },
        ScenarioAction::SetTimeWarp { percent } => RoutingCommand::SetTimeWarp(percent),
        ScenarioAction::ReportNetwork => RoutingCommand::ReportNetwork,
    }
}

/// Send each action to the routing task when the shared clock reaches its time.
#[embassy_executor::task]
pub async fn scenario_script_task(actions: Vec<ScheduledAction>, clock: RoutingClock, command_tx: RoutingCommandSender) {
    if actions.is_empty() {
        return;
    }
    let actions = ordered_actions(actions);
    log::info!("Scenario script started: {} actions", actions.len());

    for scheduled in actions {
        Timer::at(clock.instant_at(scheduled.at_s)).await;
        log::debug!("Script t+{:.1}s: {:?}", scheduled.at_s, scheduled.action);
        command_tx.send(action_command(scheduled.action, clock.epoch_ms())).await;
    }
    log::info!("Scenario script finished");
}
