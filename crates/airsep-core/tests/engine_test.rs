//! Closed-loop tests: the full detect → track → resolve → retire cycle
//! against straight-line traffic integrated in lockstep.

use airsep_core::geometry::{bearing_distance, east_north, position_at, NM};
use airsep_core::{AircraftState, AreaRegistry, Asas, AsasConfig, Traffic};

struct TestTraffic {
    states: Vec<AircraftState>,
    resumed: Vec<String>,
}

impl TestTraffic {
    fn new(states: Vec<AircraftState>) -> Self {
        Self {
            states,
            resumed: Vec::new(),
        }
    }

    /// Apply the active resolution commands, then integrate positions.
    fn step(&mut self, asas: &Asas, dt: f64) {
        for slot in 0..self.states.len() {
            if let Some(cmd) = asas.command(slot) {
                let state = &mut self.states[slot];
                if let (Some(track), Some(gs)) = (cmd.track_deg, cmd.ground_speed_mps) {
                    let (gs_east, gs_north) = east_north(track, gs);
                    state.track_deg = track;
                    state.gs_east = gs_east;
                    state.gs_north = gs_north;
                }
                if let Some(vs) = cmd.vertical_speed_mps {
                    state.vs_mps = vs;
                }
            }
        }
        for state in &mut self.states {
            let dist = state.ground_speed() * dt;
            let (lat, lon) = position_at(state.lat, state.lon, state.track_deg, dist);
            state.lat = lat;
            state.lon = lon;
            state.alt_m += state.vs_mps * dt;
        }
    }

    fn horizontal_separation(&self, i: usize, j: usize) -> f64 {
        let a = &self.states[i];
        let b = &self.states[j];
        let (_, dist) = bearing_distance(a.lat, a.lon, b.lat, b.lon);
        dist
    }
}

impl Traffic for TestTraffic {
    fn count(&self) -> usize {
        self.states.len()
    }
    fn state(&self, slot: usize) -> Option<&AircraftState> {
        self.states.get(slot)
    }
    fn slot_of(&self, id: &str) -> Option<usize> {
        self.states.iter().position(|s| s.id == id)
    }
    fn autopilot_altitude(&self, slot: usize) -> f64 {
        self.states[slot].alt_m
    }
    fn resume_navigation(&mut self, slot: usize) {
        let id = self.states[slot].id.clone();
        self.resumed.push(id);
    }
}

fn aircraft(id: &str, lat: f64, lon: f64, track: f64, gs: f64) -> AircraftState {
    let (gs_east, gs_north) = east_north(track, gs);
    AircraftState {
        id: id.to_string(),
        lat,
        lon,
        alt_m: 10_000.0,
        track_deg: track,
        gs_east,
        gs_north,
        vs_mps: 0.0,
        tas_mps: gs,
    }
}

/// Two aircraft 18 km apart closing head-on at 400 m/s.
fn head_on() -> TestTraffic {
    TestTraffic::new(vec![
        aircraft("AC1", 0.0, 0.0, 90.0, 200.0),
        aircraft("AC2", 0.0, 0.162, 270.0, 200.0),
    ])
}

fn run(asas: &mut Asas, traf: &mut TestTraffic, duration: f64, dt: f64) -> f64 {
    let areas = AreaRegistry::new();
    let mut min_sep = f64::INFINITY;
    let mut simt = 0.0;
    while simt < duration {
        asas.update(traf, &areas, simt);
        traf.step(asas, dt);
        simt += dt;
        min_sep = min_sep.min(traf.horizontal_separation(0, 1));
    }
    min_sep
}

#[test]
fn head_on_geometry_is_predicted_correctly() {
    let mut asas = Asas::default();
    let mut traf = head_on();
    asas.update(&mut traf, &AreaRegistry::new(), 0.0);

    let det = asas.last_detection();
    assert_eq!(det.pairs.len(), 2);
    let pair = &det.pairs[0];
    assert!((pair.t_cpa - 45.0).abs() < 1.5, "t_cpa = {}", pair.t_cpa);
    // The pair enters the zone roughly R/closure before CPA.
    let closure = 400.0;
    let expected_t_in = pair.t_cpa - 5.0 * NM / closure;
    assert!((pair.t_in - expected_t_in).abs() < 1.0);
}

#[test]
fn unresolved_head_on_loses_separation() {
    let mut asas = Asas::default();
    asas.set_resolver("OFF").unwrap();
    let mut traf = head_on();

    let min_sep = run(&mut asas, &mut traf, 90.0, 1.0);

    assert!(min_sep < asas.config().detection_radius_m);
    assert!(asas.tracker().total_losses() >= 1);
    // The LOS ended and was logged exactly once.
    assert_eq!(asas.tracker().los_logged_events(), 1);
}

#[test]
fn resolved_head_on_keeps_separation() {
    let mut asas = Asas::default();
    let mut traf = head_on();

    let min_sep = run(&mut asas, &mut traf, 180.0, 1.0);

    assert!(
        min_sep >= asas.config().detection_radius_m,
        "min separation {min_sep} m dipped below the protection zone"
    );
    assert!(asas.tracker().total_conflicts() >= 1);
    assert_eq!(asas.tracker().total_losses(), 0);
}

#[test]
fn encounter_retires_and_navigation_resumes() {
    let mut asas = Asas::default();
    let mut traf = head_on();

    run(&mut asas, &mut traf, 300.0, 1.0);

    assert_eq!(asas.tracker().conflict_count(), 0);
    assert!(!asas.is_active(0));
    assert!(!asas.is_active(1));
    assert!(traf.resumed.contains(&"AC1".to_string()));
    assert!(traf.resumed.contains(&"AC2".to_string()));
}

#[test]
fn mid_conflict_deletion_releases_the_survivor() {
    let mut asas = Asas::default();
    let mut traf = head_on();
    let areas = AreaRegistry::new();

    asas.update(&mut traf, &areas, 0.0);
    assert!(asas.is_active(0));

    traf.states.remove(1);
    asas.aircraft_deleted("AC2", 1);
    asas.update(&mut traf, &areas, 1.0);

    assert_eq!(asas.tracker().conflict_count(), 0);
    assert!(!asas.is_active(0));
    assert_eq!(traf.resumed, vec!["AC1".to_string()]);
}

#[test]
fn wider_protection_zone_detects_earlier() {
    let mut narrow = Asas::default();
    let mut wide = Asas::new(AsasConfig::default());
    wide.config_mut().set_detection_radius(8.0 * NM).unwrap();

    let areas = AreaRegistry::new();
    let mut traf1 = head_on();
    let mut traf2 = head_on();
    narrow.update(&mut traf1, &areas, 0.0);
    wide.update(&mut traf2, &areas, 0.0);

    let t_in_narrow = narrow.last_detection().pairs[0].t_in;
    let t_in_wide = wide.last_detection().pairs[0].t_in;
    assert!(t_in_wide < t_in_narrow);
}
