//! Constellation router.
//!
//! Loads a scenario and a config, seeds the routing controller with the
//! scenario's ground stations, Walker shells and flows, then runs the routing
//! task, the demo orbital feed and the scenario script on an embassy executor
//! thread. Routing events are logged on the main thread.
//!
//! Usage: `constellation-routing <scenario.json> [config.toml]`

use anyhow::{Context, bail};
use embassy_executor::{Executor, Spawner};
use env_logger::Builder;
use log::{LevelFilter, debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant as StdInstant};

mod common;
mod config;
mod feed;
mod routing;
mod time_driver;

use common::scenario::{Scenario, ScheduledAction, load_scenario};
use config::RouterConfig;
use feed::script::scenario_script_task;
use feed::{OrbitalFeed, orbital_feed_task};
use routing::events::{RoutingCommandChannel, RoutingCommandReceiver, RoutingCommandSender, RoutingEventChannel, RoutingEventReceiver, RoutingEventSender};
use routing::routing_task::{RoutingClock, routing_task};
use routing::{EdgeKind, GeoRegionIndex, RoutingController, RoutingEvent};

const MAIN_LOOP_POLL_INTERVAL: StdDuration = StdDuration::from_millis(50);

/// Build the controller in its epoch state: ground stations, satellites at
/// their t = 0 positions, inter-satellite links, ground links and flows.
fn build_controller(scenario: &Scenario, config: &RouterConfig, feed: &OrbitalFeed) -> anyhow::Result<RoutingController> {
    let regions = GeoRegionIndex::from_definitions(scenario.regions.clone(), config.crossing_mode).context("Invalid region definitions")?;
    info!("Loaded {} denied regions ({:?} crossing checks)", regions.len(), regions.crossing_mode());

    let mut controller = RoutingController::new(Arc::new(regions), config.controller_settings());

    for station in &scenario.ground_stations {
        controller.add_ground_station(&station.id, station.geo());
    }
    for state in feed.states_at(0.0) {
        controller.add_satellite(&state.id, state.position, Some(state.geo));
    }
    for (from, to) in feed.isl_pairs() {
        controller.connect(&from, &to, EdgeKind::InterSatellite, None);
    }
    let refresh = controller.refresh_ground_links();
    for flow in &scenario.flows {
        controller.register_flow(flow.clone());
    }

    info!(
        "Network ready: {} nodes, {} directed links ({} ground links), {} flows",
        controller.graph().node_count(),
        controller.graph().edge_count(),
        refresh.added,
        controller.flows().count()
    );
    Ok(controller)
}

fn embassy_init(
    spawner: Spawner,
    controller: RoutingController,
    feed: OrbitalFeed,
    actions: Vec<ScheduledAction>,
    config: RouterConfig,
    command_tx: RoutingCommandSender,
    command_rx: RoutingCommandReceiver,
    event_tx: RoutingEventSender,
) {
    let clock = RoutingClock::start();
    let tick_interval = embassy_time::Duration::from_millis(config.tick_interval_ms);
    let feed_interval = embassy_time::Duration::from_millis(config.feed_interval_ms);
    let _ = spawner.spawn(routing_task(controller, clock, tick_interval, command_rx, event_tx));
    let _ = spawner.spawn(orbital_feed_task(feed, feed_interval, command_tx));
    let _ = spawner.spawn(scenario_script_task(actions, clock, command_tx));
}

fn log_event(event: &RoutingEvent) {
    match event {
        RoutingEvent::Alert(message) => warn!("{}", message),
        RoutingEvent::NodeRegionChanged { node_id, region } => match region {
            Some(region) => info!("{} entered region {}", node_id, region),
            None => info!("{} left denied airspace", node_id),
        },
        RoutingEvent::EdgeActivityChanged { from, to, active } => {
            debug!("Link {} -> {} {}", from, to, if *active { "up" } else { "down" })
        }
        RoutingEvent::PathUpdated { flow_id, path } => match path {
            Some(path) => info!(
                "Flow {}: {} | {:.2} ms, {:.0} km, {} hops{}",
                flow_id,
                path.id,
                path.total_delay,
                path.total_distance / 1000.0,
                path.hop_count(),
                if path.crosses_denied_region {
                    format!(", crosses {}", path.denied_regions.join(", "))
                } else {
                    String::new()
                }
            ),
            None => info!("Flow {}: unroutable", flow_id),
        },
        RoutingEvent::PathResult { source, destination, paths } => {
            info!("{} alternative paths {} -> {}", paths.len(), source, destination);
            for path in paths {
                info!("  {} ({:.2} ms)", path.id, path.total_delay);
            }
        }
        RoutingEvent::PredictivePaths { flow_id, paths } => {
            for path in paths {
                debug!("Flow {} preview {} ({:.2} ms)", flow_id, path.id, path.total_delay);
            }
        }
        RoutingEvent::TickCompleted { tick, nodes, edges, elapsed } => {
            debug!("Tick {}: {} nodes, {} links, {} us", tick, nodes, edges, elapsed.as_micros())
        }
        RoutingEvent::TimeWarpChanged(percent) => info!("Time warp now {}%", percent),
        RoutingEvent::NetworkSnapshot(graph) => {
            let inside_regions = graph.nodes().filter(|n| n.in_denied_region()).count();
            let active = graph.edges().filter(|e| e.active).count();
            let crossing = graph.edges().filter(|e| e.crossing.is_denied_region).count();
            info!(
                "Network: {} nodes ({} inside denied regions), {} directed links ({} active, {} crossing denied regions)",
                graph.node_count(),
                inside_regions,
                graph.edge_count(),
                active,
                crossing
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("constellation_routing"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(scenario_path) = args.next() else {
        bail!("Usage: constellation-routing <scenario.json> [config.toml]");
    };
    let config = match args.next() {
        Some(config_path) => RouterConfig::load(Path::new(&config_path))?,
        None => RouterConfig::load_or_default(&RouterConfig::config_path_from_scenario(&scenario_path))?,
    };
    let scenario = load_scenario(&scenario_path).with_context(|| format!("Failed to load scenario {}", scenario_path))?;
    info!("Starting up with scenario {}", scenario_path);

    time_driver::set_time_warp_percent(config.time_warp_percent);

    let feed = OrbitalFeed::from_scenario(&scenario);
    let controller = build_controller(&scenario, &config, &feed)?;
    let actions = scenario.actions;
    let run_for = config.run_seconds.map(StdDuration::from_secs);

    let command_channel: &'static RoutingCommandChannel = Box::leak(Box::new(RoutingCommandChannel::new()));
    let event_channel: &'static RoutingEventChannel = Box::leak(Box::new(RoutingEventChannel::new()));
    let command_tx = command_channel.sender();
    let command_rx = command_channel.receiver();
    let event_tx = event_channel.sender();
    let event_rx: RoutingEventReceiver = event_channel.receiver();

    thread::Builder::new()
        .stack_size(16 * 1024 * 1024)
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, controller, feed, actions, config, command_tx, command_rx, event_tx));
        })
        .context("Failed to spawn embassy executor thread")?;

    let started = StdInstant::now();
    loop {
        while let Ok(event) = event_rx.try_receive() {
            log_event(&event);
        }
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            info!("Run time elapsed, shutting down");
            return Ok(());
        }
        thread::sleep(MAIN_LOOP_POLL_INTERVAL);
    }
}
