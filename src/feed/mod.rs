//! Demo command sources.
//!
//! The orbital feed stands in for an external ephemeris source: it propagates
//! the scenario's Walker shells on the (warped) embassy clock and pushes every
//! satellite's new position into the routing command channel. The scenario
//! script plays the network operator.

pub mod script;
pub mod walker;

use embassy_time::{Duration, Instant, Timer};

use crate::common::scenario::Scenario;
use crate::routing::events::{RoutingCommand, RoutingCommandSender};
use walker::{SatelliteState, WalkerShell};

#[derive(Debug, Clone, Default)]
pub struct OrbitalFeed {
    shells: Vec<WalkerShell>,
}

impl OrbitalFeed {
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            shells: scenario.shells.iter().map(WalkerShell::from).collect(),
        }
    }

    pub fn satellite_count(&self) -> usize {
        self.shells.iter().map(|s| s.total_sats() as usize).sum()
    }

    /// Every satellite of every shell, `time_s` seconds after the feed epoch.
    pub fn states_at(&self, time_s: f64) -> Vec<SatelliteState> {
        self.shells.iter().flat_map(|shell| shell.satellite_states(time_s)).collect()
    }

    /// Inter-satellite links of all shells.
    pub fn isl_pairs(&self) -> Vec<(String, String)> {
        self.shells.iter().flat_map(WalkerShell::isl_pairs).collect()
    }
}

/// Sweep all satellite positions into the routing task every `interval`.
///
/// The feed epoch is the moment the task starts; the controller is seeded
/// with the epoch positions before that.
#[embassy_executor::task]
pub async fn orbital_feed_task(feed: OrbitalFeed, interval: Duration, command_tx: RoutingCommandSender) {
    let epoch = Instant::now();
    let mut next_sweep = epoch + interval;
    log::info!("Orbital feed started: {} satellites every {} ms", feed.satellite_count(), interval.as_millis());
    for shell in &feed.shells {
        log::debug!("Shell {}: {} satellites, period {:.1} min", shell.name, shell.total_sats(), shell.period_s() / 60.0);
    }

    loop {
        Timer::at(next_sweep).await;
        let time_s = Instant::now().duration_since(epoch).as_micros() as f64 / 1_000_000.0;
        let states = feed.states_at(time_s);
        log::trace!("Feed sweep at t+{:.1}s: {} positions", time_s, states.len());
        for state in states {
            // Back-pressure: wait for the routing task rather than dropping updates
            command_tx
                .send(RoutingCommand::UpdateNodePosition {
                    id: state.id,
                    position: state.position,
                    geo: Some(state.geo),
                })
                .await;
        }
        next_sweep += interval;
        let now = Instant::now();
        if next_sweep < now {
            next_sweep = now + interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::scenario::parse_scenario;

    #[test]
    fn feed_covers_every_scenario_satellite() {
        let scenario = parse_scenario(
            r#"{
                "shells": [
                    { "name": "low", "altitude_km": 550, "inclination_deg": 53, "planes": 3, "sats_per_plane": 4 },
                    { "name": "polar", "altitude_km": 1200, "inclination_deg": 87.9, "planes": 2, "sats_per_plane": 5, "phasing": 1 }
                ]
            }"#,
        )
        .unwrap();
        let feed = OrbitalFeed::from_scenario(&scenario);
        assert_eq!(feed.satellite_count(), 22);

        let ids: Vec<String> = feed.states_at(0.0).into_iter().map(|s| s.id).collect();
        let expected: Vec<String> = scenario.shells.iter().flat_map(|s| s.satellite_ids()).collect();
        assert_eq!(ids, expected);
        // 3x4 grid: 24 links; 2x5: 10 intra + 5 inter
        assert_eq!(feed.isl_pairs().len(), 24 + 15);
    }
}
