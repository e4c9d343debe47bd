//! Pre-defined encounter scenarios for exercising the engine.

use airsep_core::geometry::position_at;
use clap::ValueEnum;

use crate::traffic::{SimAircraft, SimTraffic};

/// Encounter geometry to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Two aircraft closing head-on at the same level.
    HeadOn,
    /// Perpendicular tracks crossing at a common point.
    Crossing,
    /// Parallel tracks with ample lateral separation (no conflict).
    Parallel,
    /// Co-track pair converging vertically.
    Vertical,
}

impl ScenarioKind {
    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::HeadOn => "head-on",
            ScenarioKind::Crossing => "crossing",
            ScenarioKind::Parallel => "parallel",
            ScenarioKind::Vertical => "vertical",
        }
    }
}

/// Build the traffic picture for a scenario centered on the given point.
pub fn build(kind: ScenarioKind, center_lat: f64, center_lon: f64) -> SimTraffic {
    let cruise_alt = 10_000.0;
    let cruise_speed = 200.0;

    match kind {
        ScenarioKind::HeadOn => {
            let offset_m = 9_000.0;
            let (lat1, lon1) = position_at(center_lat, center_lon, 270.0, offset_m);
            let (lat2, lon2) = position_at(center_lat, center_lon, 90.0, offset_m);
            SimTraffic::new(vec![
                SimAircraft::new("AC1", lat1, lon1, cruise_alt, 90.0, cruise_speed),
                SimAircraft::new("AC2", lat2, lon2, cruise_alt, 270.0, cruise_speed),
            ])
        }
        ScenarioKind::Crossing => {
            let offset_m = 12_000.0;
            let (lat1, lon1) = position_at(center_lat, center_lon, 270.0, offset_m);
            let (lat2, lon2) = position_at(center_lat, center_lon, 180.0, offset_m);
            SimTraffic::new(vec![
                SimAircraft::new("AC1", lat1, lon1, cruise_alt, 90.0, cruise_speed),
                SimAircraft::new("AC2", lat2, lon2, cruise_alt, 0.0, cruise_speed),
            ])
        }
        ScenarioKind::Parallel => {
            let lateral_m = 20_000.0;
            let (lat2, lon2) = position_at(center_lat, center_lon, 0.0, lateral_m);
            SimTraffic::new(vec![
                SimAircraft::new("AC1", center_lat, center_lon, cruise_alt, 90.0, cruise_speed),
                SimAircraft::new("AC2", lat2, lon2, cruise_alt, 90.0, cruise_speed),
            ])
        }
        ScenarioKind::Vertical => {
            // Same track, the trailing aircraft already inside the
            // horizontal zone, the leader descending through its level.
            let (lat2, lon2) = position_at(center_lat, center_lon, 90.0, 2_000.0);
            SimTraffic::new(vec![
                SimAircraft::new("AC1", center_lat, center_lon, cruise_alt, 90.0, cruise_speed),
                SimAircraft::new("AC2", lat2, lon2, cruise_alt + 600.0, 90.0, cruise_speed)
                    .with_vertical_speed(-5.0, cruise_alt - 600.0),
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airsep_core::geometry::bearing_distance;
    use airsep_core::Traffic;

    #[test]
    fn head_on_pair_is_reciprocal() {
        let traf = build(ScenarioKind::HeadOn, 0.0, 0.0);
        assert_eq!(traf.count(), 2);
        let a = traf.state(0).unwrap();
        let b = traf.state(1).unwrap();
        let (_, dist) = bearing_distance(a.lat, a.lon, b.lat, b.lon);
        assert!((dist - 18_000.0).abs() < 10.0);
        assert_eq!(a.track_deg, 90.0);
        assert_eq!(b.track_deg, 270.0);
    }

    #[test]
    fn parallel_pair_keeps_lateral_separation() {
        let traf = build(ScenarioKind::Parallel, 0.0, 0.0);
        let a = traf.state(0).unwrap();
        let b = traf.state(1).unwrap();
        let (_, dist) = bearing_distance(a.lat, a.lon, b.lat, b.lon);
        assert!(dist > 15_000.0);
        assert_eq!(a.track_deg, b.track_deg);
    }

    #[test]
    fn vertical_pair_converges_in_altitude_only() {
        let traf = build(ScenarioKind::Vertical, 0.0, 0.0);
        let a = traf.state(0).unwrap();
        let b = traf.state(1).unwrap();
        assert!((b.alt_m - a.alt_m - 600.0).abs() < 1e-9);
        assert!(b.vs_mps < 0.0);
        assert_eq!(a.track_deg, b.track_deg);
    }
}
