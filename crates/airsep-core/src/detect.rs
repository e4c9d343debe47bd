//! State-based conflict detection over pairwise relative-motion geometry.
//!
//! Each invocation rebuilds dense N×N grids of bearing, range, relative
//! velocity and zone-crossing times, then reduces them to the set of pairs
//! whose protection zones will be violated within the lookahead horizon.
//! The grids are scratch data owned by the detector and are never kept
//! across cycles.

use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::areas::AreaRegistry;
use crate::config::{AreaFilterPolicy, AsasConfig, SensorMode};
use crate::geometry::{
    bearing_distance, cpa, position_at, vertical_crossing, zone_crossing_times, T_NEVER,
};
use crate::traffic::{AircraftState, Traffic};

/// Sentinel for diagonal (self-pair) entries of the range grid.
const SELF_RANGE: f64 = 1.0e9;

/// Floor on the vertical time-to-solve handed to the resolver [s].
const TSOLVE_V_FLOOR: f64 = 1.0;

/// Dense square grid of per-pair scalars, row = perceiving aircraft.
#[derive(Debug, Clone)]
pub struct PairGrid {
    n: usize,
    data: Vec<f64>,
}

impl PairGrid {
    pub fn new(n: usize, fill: f64) -> Self {
        Self {
            n,
            data: vec![fill; n * n],
        }
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
    }
}

/// Per-cycle pairwise geometry. Owned exclusively by the detector; rebuilt
/// from scratch every detection pass.
struct PairwiseGeometry {
    bearing: PairGrid,
    range: PairGrid,
    t_cpa: PairGrid,
    t_in: PairGrid,
    t_out: PairGrid,
    t_out_vertical: PairGrid,
    conflict: Vec<bool>,
}

/// Own-ship CPA point, projected along the aircraft's own track and speed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CpaPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

/// One detected conflict, as perceived by `own`.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictPair {
    pub own: usize,
    pub intruder: usize,
    pub own_id: String,
    pub intruder_id: String,
    /// Perceived bearing own → intruder [deg].
    pub bearing_deg: f64,
    /// Perceived range [m].
    pub distance_m: f64,
    pub t_cpa: f64,
    pub t_in: f64,
    pub t_out: f64,
    /// Time to solve the conflict vertically [s]; very large when there is
    /// no meaningful relative vertical rate.
    pub tsolve_v: f64,
    pub own_cpa: CpaPoint,
    pub intruder_cpa: CpaPoint,
    /// True (unperturbed) current separations, for LOS classification.
    pub horizontal_sep_m: f64,
    pub vertical_sep_m: f64,
    pub horizontal_los: bool,
    pub vertical_los: bool,
}

impl ConflictPair {
    pub fn is_los(&self) -> bool {
        self.horizontal_los && self.vertical_los
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub pairs: Vec<ConflictPair>,
    /// Per-aircraft minimum conflict entry time over all of its conflicts.
    pub t_in_min: Vec<f64>,
    /// Per-aircraft minimum vertical time-to-solve over all of its conflicts.
    pub tsolve_v_min: Vec<f64>,
    /// Whether the pass used symmetric (ground-truth) perception.
    pub symmetric: bool,
}

impl Detection {
    fn empty(n: usize, symmetric: bool) -> Self {
        Self {
            pairs: Vec::new(),
            t_in_min: vec![T_NEVER; n],
            tsolve_v_min: vec![T_NEVER; n],
            symmetric,
        }
    }
}

/// A conflict-detection algorithm.
pub trait ConflictDetector {
    fn name(&self) -> &'static str;

    fn detect(
        &mut self,
        traf: &dyn Traffic,
        cfg: &AsasConfig,
        areas: &AreaRegistry,
        simt: f64,
    ) -> Detection;
}

/// The classic state-based detector: closed-form CPA on straight-line
/// extrapolation of the current velocity vectors.
#[derive(Debug, Default)]
pub struct StateBasedDetector;

impl StateBasedDetector {
    pub fn new() -> Self {
        Self
    }

    fn build_geometry(
        &self,
        states: &[AircraftState],
        cfg: &AsasConfig,
    ) -> PairwiseGeometry {
        let n = states.len();
        let mut geom = PairwiseGeometry {
            bearing: PairGrid::new(n, 0.0),
            range: PairGrid::new(n, SELF_RANGE),
            t_cpa: PairGrid::new(n, T_NEVER),
            t_in: PairGrid::new(n, T_NEVER),
            t_out: PairGrid::new(n, -T_NEVER),
            t_out_vertical: PairGrid::new(n, T_NEVER),
            conflict: vec![false; n * n],
        };

        let mut rng = rand::rng();
        let noise = match cfg.sensor {
            SensorMode::Truth => None,
            SensorMode::Broadcast {
                sigma_bearing_deg,
                sigma_range_m,
                sigma_alt_m,
                sigma_vs_mps,
            } => {
                let build = |sigma: f64| Normal::new(0.0, sigma.abs()).ok();
                match (
                    build(sigma_bearing_deg),
                    build(sigma_range_m),
                    build(sigma_alt_m),
                    build(sigma_vs_mps),
                ) {
                    (Some(nb), Some(nr), Some(na), Some(nv)) => Some((nb, nr, na, nv)),
                    _ => {
                        tracing::warn!("non-finite broadcast sigma, using ground truth");
                        None
                    }
                }
            }
        };

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let own = &states[i];
                let intr = &states[j];

                // Perceived intruder geometry, perturbed per receiver when
                // the broadcast channel is degraded.
                let (mut qdr, mut range) =
                    bearing_distance(own.lat, own.lon, intr.lat, intr.lon);
                let mut intr_alt = intr.alt_m;
                let mut intr_vs = intr.vs_mps;
                if let Some((nb, nr, na, nv)) = &noise {
                    qdr += nb.sample(&mut rng);
                    range = (range + nr.sample(&mut rng)).max(0.0);
                    intr_alt += na.sample(&mut rng);
                    intr_vs += nv.sample(&mut rng);
                }

                let vrel_east = intr.gs_east - own.gs_east;
                let vrel_north = intr.gs_north - own.gs_north;
                let vrel_speed = vrel_east.hypot(vrel_north).max(1e-3);

                let (t_cpa, dist_at_cpa) = cpa(range, qdr, vrel_east, vrel_north);
                let (th_in, th_out) = zone_crossing_times(
                    dist_at_cpa,
                    cfg.detection_radius_m,
                    t_cpa,
                    vrel_speed,
                );

                let dalt = intr_alt - own.alt_m;
                let dvs = intr_vs - own.vs_mps;
                let (tv_in, tv_out) =
                    vertical_crossing(dalt, cfg.vertical_half_height_m, dvs);

                let t_in = th_in.max(tv_in);
                let t_out = th_out.min(tv_out);

                geom.bearing.set(i, j, qdr);
                geom.range.set(i, j, range);
                geom.t_cpa.set(i, j, t_cpa);
                geom.t_in.set(i, j, t_in);
                geom.t_out.set(i, j, t_out);
                geom.t_out_vertical.set(i, j, tv_out);

                geom.conflict[i * n + j] = dist_at_cpa < cfg.detection_radius_m
                    && t_in <= t_out
                    && t_out > 0.0
                    && t_in < cfg.lookahead_s;
            }
        }

        geom
    }

    /// Projected CPA point along the aircraft's own track and speed.
    fn own_cpa(state: &AircraftState, t_cpa: f64) -> CpaPoint {
        let range = t_cpa * state.ground_speed();
        let (lat, lon) = position_at(state.lat, state.lon, state.track_deg, range);
        CpaPoint {
            lat,
            lon,
            alt_m: state.alt_m + t_cpa * state.vs_mps,
        }
    }

    fn area_filter_passes(
        policy: AreaFilterPolicy,
        area: &str,
        areas: &AreaRegistry,
        own: &AircraftState,
        intr: &AircraftState,
        own_cpa: &CpaPoint,
        intr_cpa: &CpaPoint,
    ) -> bool {
        let cpa_own = areas.inside(area, own_cpa.lat, own_cpa.lon, own_cpa.alt_m);
        let cpa_intr = areas.inside(area, intr_cpa.lat, intr_cpa.lon, intr_cpa.alt_m);
        let ac_own = || areas.inside(area, own.lat, own.lon, own.alt_m);
        let ac_intr = || areas.inside(area, intr.lat, intr.lon, intr.alt_m);

        match policy {
            AreaFilterPolicy::CpaBoth => cpa_own && cpa_intr,
            AreaFilterPolicy::CpaBothOneAircraft => cpa_own && cpa_intr && (ac_own() || ac_intr()),
            AreaFilterPolicy::CpaBothBothAircraft => cpa_own && cpa_intr && ac_own() && ac_intr(),
            AreaFilterPolicy::CpaEither => cpa_own || cpa_intr,
            AreaFilterPolicy::AircraftEither => ac_own() || ac_intr(),
            AreaFilterPolicy::Any => cpa_own || cpa_intr || ac_own() || ac_intr(),
        }
    }
}

impl ConflictDetector for StateBasedDetector {
    fn name(&self) -> &'static str {
        "STATEBASED"
    }

    fn detect(
        &mut self,
        traf: &dyn Traffic,
        cfg: &AsasConfig,
        areas: &AreaRegistry,
        simt: f64,
    ) -> Detection {
        let symmetric = matches!(cfg.sensor, SensorMode::Truth);
        let states: Vec<AircraftState> = (0..traf.count())
            .filter_map(|slot| traf.state(slot).cloned())
            .collect();
        let n = states.len();
        if n < 2 {
            return Detection::empty(n, symmetric);
        }

        let geom = self.build_geometry(&states, cfg);
        let mut det = Detection::empty(n, symmetric);

        for i in 0..n {
            for j in 0..n {
                if i == j || !geom.conflict[i * n + j] {
                    continue;
                }
                let own = &states[i];
                let intr = &states[j];
                // Distinct slots that resolve to one physical aircraft are
                // skipped rather than reported as a self-conflict.
                if own.id == intr.id {
                    continue;
                }

                let t_cpa = geom.t_cpa.get(i, j);
                let own_cpa = Self::own_cpa(own, t_cpa);
                let intr_cpa = Self::own_cpa(intr, t_cpa);

                if let Some((policy, area)) = &cfg.area_filter {
                    if !Self::area_filter_passes(
                        *policy, area, areas, own, intr, &own_cpa, &intr_cpa,
                    ) {
                        continue;
                    }
                }

                // LOS test on true geometry, independent of sensor noise.
                let (_, h_sep) = bearing_distance(own.lat, own.lon, intr.lat, intr.lon);
                let v_sep = (own.alt_m - intr.alt_m).abs();
                let h_los = h_sep < cfg.detection_radius_m;
                let v_los = v_sep < cfg.vertical_half_height_m;

                let t_in = geom.t_in.get(i, j);
                let t_out = geom.t_out.get(i, j);
                let tsolve_v = geom.t_out_vertical.get(i, j).clamp(TSOLVE_V_FLOOR, T_NEVER);

                det.t_in_min[i] = det.t_in_min[i].min(t_in);
                det.tsolve_v_min[i] = det.tsolve_v_min[i].min(tsolve_v);

                det.pairs.push(ConflictPair {
                    own: i,
                    intruder: j,
                    own_id: own.id.clone(),
                    intruder_id: intr.id.clone(),
                    bearing_deg: geom.bearing.get(i, j),
                    distance_m: geom.range.get(i, j),
                    t_cpa,
                    t_in,
                    t_out,
                    tsolve_v,
                    own_cpa,
                    intruder_cpa: intr_cpa,
                    horizontal_sep_m: h_sep,
                    vertical_sep_m: v_sep,
                    horizontal_los: h_los,
                    vertical_los: v_los,
                });
            }
        }

        if !det.pairs.is_empty() {
            tracing::debug!(
                simt,
                pairs = det.pairs.len(),
                symmetric,
                "conflict detection pass"
            );
        }
        det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::AreaShape;
    use crate::geometry::east_north;

    struct StubTraffic {
        states: Vec<AircraftState>,
    }

    impl Traffic for StubTraffic {
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
        fn resume_navigation(&mut self, _slot: usize) {}
    }

    fn aircraft(id: &str, lat: f64, lon: f64, alt: f64, track: f64, gs: f64, vs: f64) -> AircraftState {
        let (gs_east, gs_north) = east_north(track, gs);
        AircraftState {
            id: id.to_string(),
            lat,
            lon,
            alt_m: alt,
            track_deg: track,
            gs_east,
            gs_north,
            vs_mps: vs,
            tas_mps: gs,
        }
    }

    fn head_on_traffic() -> StubTraffic {
        StubTraffic {
            states: vec![
                aircraft("AC1", 0.0, 0.0, 10_000.0, 90.0, 200.0, 0.0),
                aircraft("AC2", 0.0, 0.162, 10_000.0, 270.0, 200.0, 0.0),
            ],
        }
    }

    #[test]
    fn empty_traffic_yields_no_conflicts() {
        let mut detector = StateBasedDetector::new();
        let traf = StubTraffic { states: Vec::new() };
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);
        assert!(det.pairs.is_empty());
    }

    #[test]
    fn single_aircraft_never_conflicts_with_itself() {
        let mut detector = StateBasedDetector::new();
        let traf = StubTraffic {
            states: vec![aircraft("SOLO", 0.0, 0.0, 10_000.0, 90.0, 200.0, 0.0)],
        };
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);
        assert!(det.pairs.is_empty());
    }

    #[test]
    fn head_on_pair_detected_with_expected_cpa_time() {
        let mut detector = StateBasedDetector::new();
        let traf = head_on_traffic();
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);

        // Both orderings of the pair are reported in a symmetric pass.
        assert_eq!(det.pairs.len(), 2);
        let pair = &det.pairs[0];
        // ~18 km apart, 400 m/s closure.
        assert!((pair.t_cpa - 45.0).abs() < 1.5, "t_cpa = {}", pair.t_cpa);
        assert!(pair.t_in > 0.0 && pair.t_in < pair.t_cpa);
        assert!(pair.t_out > pair.t_cpa);
        assert!(!pair.is_los());
    }

    #[test]
    fn diverging_pair_not_detected() {
        let mut detector = StateBasedDetector::new();
        let traf = StubTraffic {
            states: vec![
                aircraft("AC1", 0.0, 0.0, 10_000.0, 270.0, 200.0, 0.0),
                aircraft("AC2", 0.0, 0.162, 10_000.0, 90.0, 200.0, 0.0),
            ],
        };
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);
        assert!(det.pairs.is_empty());
    }

    #[test]
    fn vertical_separation_suppresses_conflict() {
        let mut detector = StateBasedDetector::new();
        let traf = StubTraffic {
            states: vec![
                aircraft("AC1", 0.0, 0.0, 10_000.0, 90.0, 200.0, 0.0),
                aircraft("AC2", 0.0, 0.162, 11_000.0, 270.0, 200.0, 0.0),
            ],
        };
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);
        assert!(det.pairs.is_empty());
    }

    #[test]
    fn lookahead_horizon_limits_detection() {
        let mut detector = StateBasedDetector::new();
        let mut cfg = AsasConfig::default();
        cfg.set_lookahead(10.0).unwrap();
        let det = detector.detect(&head_on_traffic(), &cfg, &AreaRegistry::new(), 0.0);
        assert!(det.pairs.is_empty());
    }

    #[test]
    fn area_filter_discards_pairs_outside_region() {
        let mut detector = StateBasedDetector::new();
        let registry = AreaRegistry::new();
        // A region far away from the encounter.
        registry.define(
            "ELSEWHERE",
            AreaShape::Circle {
                lat: 45.0,
                lon: 45.0,
                radius_m: 10_000.0,
                floor_m: 0.0,
                ceiling_m: 1e9,
            },
        );
        let mut cfg = AsasConfig::default();
        cfg.set_area_filter(Some(("OPTION1", "ELSEWHERE")), &registry)
            .unwrap();
        let det = detector.detect(&head_on_traffic(), &cfg, &registry, 0.0);
        assert!(det.pairs.is_empty());

        // A region around the encounter keeps the pair.
        registry.define(
            "HERE",
            AreaShape::Circle {
                lat: 0.0,
                lon: 0.08,
                radius_m: 50_000.0,
                floor_m: 0.0,
                ceiling_m: 1e9,
            },
        );
        cfg.set_area_filter(Some(("OPTION6", "HERE")), &registry)
            .unwrap();
        let det = detector.detect(&head_on_traffic(), &cfg, &registry, 0.0);
        assert_eq!(det.pairs.len(), 2);
    }

    #[test]
    fn broadcast_mode_flags_pass_as_asymmetric() {
        let mut detector = StateBasedDetector::new();
        let mut cfg = AsasConfig::default();
        cfg.sensor = SensorMode::Broadcast {
            sigma_bearing_deg: 1.0,
            sigma_range_m: 100.0,
            sigma_alt_m: 30.0,
            sigma_vs_mps: 0.5,
        };
        let det = detector.detect(&head_on_traffic(), &cfg, &AreaRegistry::new(), 0.0);
        assert!(!det.symmetric);
    }

    #[test]
    fn already_intruding_pair_reports_los() {
        let mut detector = StateBasedDetector::new();
        let traf = StubTraffic {
            states: vec![
                aircraft("AC1", 0.0, 0.0, 10_000.0, 90.0, 200.0, 0.0),
                aircraft("AC2", 0.0, 0.04, 10_000.0, 270.0, 200.0, 0.0),
            ],
        };
        let det = detector.detect(&traf, &AsasConfig::default(), &AreaRegistry::new(), 0.0);
        assert!(!det.pairs.is_empty());
        assert!(det.pairs[0].is_los());
        assert!(det.pairs[0].t_in < 0.0);
    }
}
