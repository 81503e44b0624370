//! Circular-orbit Walker delta shells.
//!
//! Satellites of a shell share one altitude and inclination. Planes are
//! spread evenly in right ascension over 360 degrees; satellites are spread
//! evenly along each plane and offset plane to plane by the phasing factor.
//! Positions are returned in the Earth-fixed frame used by the graph.

use std::f64::consts::PI;

use crate::common::scenario::ShellDefinition;
use crate::routing::types::{EARTH_RADIUS_KM, GeoPosition, Vec3};

/// Earth gravitational parameter, km^3/s^2.
pub const EARTH_MU_KM3_S2: f64 = 398_600.4418;
/// Earth rotation rate, rad/s.
pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115_9e-5;

#[derive(Debug, Clone)]
pub struct WalkerShell {
    pub name: String,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub planes: u32,
    pub sats_per_plane: u32,
    pub phasing: u32,
}

#[derive(Debug, Clone)]
pub struct SatelliteState {
    pub id: String,
    pub position: Vec3,
    pub geo: GeoPosition,
}

impl From<&ShellDefinition> for WalkerShell {
    fn from(shell: &ShellDefinition) -> Self {
        Self {
            name: shell.name.clone(),
            altitude_km: shell.altitude_km,
            inclination_deg: shell.inclination_deg,
            planes: shell.planes,
            sats_per_plane: shell.sats_per_plane,
            phasing: shell.phasing,
        }
    }
}

impl WalkerShell {
    pub fn orbit_radius_km(&self) -> f64 {
        EARTH_RADIUS_KM + self.altitude_km
    }

    pub fn mean_motion_rad_s(&self) -> f64 {
        (EARTH_MU_KM3_S2 / self.orbit_radius_km().powi(3)).sqrt()
    }

    pub fn period_s(&self) -> f64 {
        2.0 * PI / self.mean_motion_rad_s()
    }

    pub fn total_sats(&self) -> u32 {
        self.planes * self.sats_per_plane
    }

    pub fn satellite_id(&self, plane: u32, index: u32) -> String {
        format!("sat_{}_{}_{}", self.name, plane, index)
    }

    /// Earth-fixed position of one satellite `time_s` seconds after epoch.
    pub fn position(&self, plane: u32, index: u32, time_s: f64) -> Vec3 {
        let r = self.orbit_radius_km();
        let inc = self.inclination_deg.to_radians();
        let raan = 2.0 * PI * plane as f64 / self.planes as f64;
        let phase_step = self.phasing as f64 * 2.0 * PI / self.total_sats() as f64;
        let arg_latitude = 2.0 * PI * index as f64 / self.sats_per_plane as f64 + phase_step * plane as f64 + self.mean_motion_rad_s() * time_s;

        // Perifocal -> inertial
        let (sin_u, cos_u) = arg_latitude.sin_cos();
        let (sin_raan, cos_raan) = raan.sin_cos();
        let (sin_inc, cos_inc) = inc.sin_cos();
        let x = r * (cos_raan * cos_u - sin_raan * sin_u * cos_inc);
        let y = r * (sin_raan * cos_u + cos_raan * sin_u * cos_inc);
        let z = r * sin_u * sin_inc;

        // Inertial -> Earth-fixed
        let (sin_theta, cos_theta) = (EARTH_ROTATION_RAD_S * time_s).sin_cos();
        Vec3::new(x * cos_theta + y * sin_theta, -x * sin_theta + y * cos_theta, z)
    }

    pub fn satellite_states(&self, time_s: f64) -> Vec<SatelliteState> {
        let mut states = Vec::with_capacity(self.total_sats() as usize);
        for plane in 0..self.planes {
            for index in 0..self.sats_per_plane {
                let position = self.position(plane, index, time_s);
                states.push(SatelliteState {
                    id: self.satellite_id(plane, index),
                    position,
                    geo: GeoPosition::from_ecef(&position),
                });
            }
        }
        states
    }

    /// Inter-satellite links of a +Grid topology: the next satellite in the
    /// same plane and the same slot in the next plane, wrapping around.
    /// Each undirected pair appears once.
    pub fn isl_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for plane in 0..self.planes {
            for index in 0..self.sats_per_plane {
                let here = self.satellite_id(plane, index);
                if self.sats_per_plane > 1 {
                    let next = (index + 1) % self.sats_per_plane;
                    // Two-satellite planes would otherwise list their only link twice
                    if !(self.sats_per_plane == 2 && next < index) {
                        pairs.push((here.clone(), self.satellite_id(plane, next)));
                    }
                }
                if self.planes > 1 {
                    let next_plane = (plane + 1) % self.planes;
                    if !(self.planes == 2 && next_plane < plane) {
                        pairs.push((here, self.satellite_id(next_plane, index)));
                    }
                }
            }
        }
        pairs
    }
}
