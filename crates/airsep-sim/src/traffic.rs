//! Point-mass traffic model implementing the engine's `Traffic` interface.
//!
//! Each aircraft flies either its autopilot targets (track, speed, altitude)
//! or, while ASAS holds authority over it, the current resolution command.
//! Velocity changes are applied instantly; only position integrates over
//! time.

use airsep_core::geometry::{east_north, position_at};
use airsep_core::{AircraftState, Asas, Traffic};

/// Fixed climb/descent rate the autopilot uses to capture its target
/// altitude [m/s].
const AP_CLIMB_RATE_MPS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct SimAircraft {
    pub state: AircraftState,
    pub ap_track_deg: f64,
    pub ap_speed_mps: f64,
    pub ap_alt_m: f64,
    /// Set while the aircraft is flying a resolution command.
    pub avoiding: bool,
}

impl SimAircraft {
    pub fn new(id: &str, lat: f64, lon: f64, alt_m: f64, track_deg: f64, speed_mps: f64) -> Self {
        let (gs_east, gs_north) = east_north(track_deg, speed_mps);
        Self {
            state: AircraftState {
                id: id.to_string(),
                lat,
                lon,
                alt_m,
                track_deg,
                gs_east,
                gs_north,
                vs_mps: 0.0,
                tas_mps: speed_mps,
            },
            ap_track_deg: track_deg,
            ap_speed_mps: speed_mps,
            ap_alt_m: alt_m,
            avoiding: false,
        }
    }

    pub fn with_vertical_speed(mut self, vs_mps: f64, target_alt_m: f64) -> Self {
        self.state.vs_mps = vs_mps;
        self.ap_alt_m = target_alt_m;
        self
    }
}

/// The simulated traffic picture.
#[derive(Debug, Default)]
pub struct SimTraffic {
    aircraft: Vec<SimAircraft>,
}

impl SimTraffic {
    pub fn new(aircraft: Vec<SimAircraft>) -> Self {
        Self { aircraft }
    }

    pub fn aircraft(&self) -> &[SimAircraft] {
        &self.aircraft
    }

    pub fn spawn(&mut self, aircraft: SimAircraft, asas: &mut Asas) {
        asas.aircraft_created(&aircraft.state.id);
        self.aircraft.push(aircraft);
    }

    pub fn delete(&mut self, id: &str, asas: &mut Asas) -> bool {
        match self.aircraft.iter().position(|a| a.state.id == id) {
            Some(slot) => {
                self.aircraft.remove(slot);
                asas.aircraft_deleted(id, slot);
                true
            }
            None => false,
        }
    }

    /// Advance every aircraft by `dt`, flying either the active resolution
    /// command or the autopilot targets.
    pub fn step(&mut self, asas: &Asas, dt: f64) {
        for slot in 0..self.aircraft.len() {
            let command = asas.command(slot).copied();
            let ac = &mut self.aircraft[slot];

            match command {
                Some(cmd) => {
                    ac.avoiding = true;
                    let track = cmd.track_deg.unwrap_or(ac.state.track_deg);
                    let speed = cmd.ground_speed_mps.unwrap_or_else(|| ac.state.ground_speed());
                    let vs = cmd.vertical_speed_mps.unwrap_or(ac.state.vs_mps);
                    set_velocity(&mut ac.state, track, speed, vs);
                }
                None => {
                    ac.avoiding = false;
                    let alt_error = ac.ap_alt_m - ac.state.alt_m;
                    let vs = if alt_error.abs() < AP_CLIMB_RATE_MPS * dt {
                        0.0
                    } else {
                        AP_CLIMB_RATE_MPS.copysign(alt_error)
                    };
                    set_velocity(&mut ac.state, ac.ap_track_deg, ac.ap_speed_mps, vs);
                    if vs == 0.0 {
                        ac.state.alt_m = ac.ap_alt_m;
                    }
                }
            }

            let distance = ac.state.ground_speed() * dt;
            let (lat, lon) = position_at(ac.state.lat, ac.state.lon, ac.state.track_deg, distance);
            ac.state.lat = lat;
            ac.state.lon = lon;
            ac.state.alt_m += ac.state.vs_mps * dt;
        }
    }
}

fn set_velocity(state: &mut AircraftState, track_deg: f64, speed_mps: f64, vs_mps: f64) {
    let (gs_east, gs_north) = east_north(track_deg, speed_mps);
    state.track_deg = track_deg.rem_euclid(360.0);
    state.gs_east = gs_east;
    state.gs_north = gs_north;
    state.vs_mps = vs_mps;
    state.tas_mps = speed_mps;
}

impl Traffic for SimTraffic {
    fn count(&self) -> usize {
        self.aircraft.len()
    }

    fn state(&self, slot: usize) -> Option<&AircraftState> {
        self.aircraft.get(slot).map(|a| &a.state)
    }

    fn slot_of(&self, id: &str) -> Option<usize> {
        self.aircraft.iter().position(|a| a.state.id == id)
    }

    fn autopilot_altitude(&self, slot: usize) -> f64 {
        self.aircraft
            .get(slot)
            .map(|a| a.ap_alt_m)
            .unwrap_or_default()
    }

    fn resume_navigation(&mut self, slot: usize) {
        if let Some(ac) = self.aircraft.get_mut(slot) {
            ac.avoiding = false;
            let track = ac.ap_track_deg;
            let speed = ac.ap_speed_mps;
            set_velocity(&mut ac.state, track, speed, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autopilot_holds_track_and_captures_altitude() {
        let asas = Asas::default();
        let mut traf = SimTraffic::new(vec![
            SimAircraft::new("AC1", 0.0, 0.0, 1_000.0, 90.0, 100.0).with_vertical_speed(0.0, 1_050.0),
        ]);

        for _ in 0..20 {
            traf.step(&asas, 1.0);
        }
        let state = traf.state(0).unwrap();
        // 100 m/s east for 20 s.
        assert!(state.lon > 0.0);
        assert!(state.lat.abs() < 1e-6);
        // Climbed at 5 m/s for 10 s, then captured.
        assert!((state.alt_m - 1_050.0).abs() < 1.0);
    }

    #[test]
    fn resume_navigation_restores_autopilot_velocity() {
        let mut traf = SimTraffic::new(vec![SimAircraft::new("AC1", 0.0, 0.0, 1_000.0, 90.0, 100.0)]);
        // Knock the aircraft off its track as a resolution would.
        set_velocity(&mut traf.aircraft[0].state, 120.0, 130.0, 2.0);

        traf.resume_navigation(0);
        let state = traf.state(0).unwrap();
        assert!((state.track_deg - 90.0).abs() < 1e-9);
        assert!((state.ground_speed() - 100.0).abs() < 1e-9);
        assert_eq!(state.vs_mps, 0.0);
    }

    #[test]
    fn spawn_and_delete_keep_slots_dense() {
        let mut asas = Asas::default();
        let mut traf = SimTraffic::default();
        traf.spawn(SimAircraft::new("AC1", 0.0, 0.0, 1_000.0, 90.0, 100.0), &mut asas);
        traf.spawn(SimAircraft::new("AC2", 0.1, 0.0, 1_000.0, 90.0, 100.0), &mut asas);
        assert_eq!(traf.slot_of("AC2"), Some(1));

        assert!(traf.delete("AC1", &mut asas));
        assert!(!traf.delete("AC1", &mut asas));
        assert_eq!(traf.slot_of("AC2"), Some(0));
    }
}
