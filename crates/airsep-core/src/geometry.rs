//! Spherical and relative-motion geometry shared by the detector and resolver.
//!
//! All bearings are in degrees, 0 = north, clockwise positive. The same
//! great-circle model is used everywhere in the pipeline; relative motion is
//! handled in a local east/north frame derived from bearing and range.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One nautical mile in meters.
pub const NM: f64 = 1852.0;
/// One foot in meters.
pub const FT: f64 = 0.3048;
/// One foot-per-minute in meters per second.
pub const FPM: f64 = FT / 60.0;

/// Sentinel "never happens" time used for non-conflicting geometry.
pub const T_NEVER: f64 = 1.0e8;

/// Floor on squared relative speed before dividing (≈1e-3 m/s relative speed).
const REL_SPEED_SQ_FLOOR: f64 = 1e-6;

/// Floor on relative vertical rate before dividing.
const VERTICAL_RATE_FLOOR: f64 = 1e-6;

/// Great-circle bearing (degrees) and haversine distance (meters) from point
/// A to point B.
pub fn bearing_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> (f64, f64) {
    let phi1 = lat_a.to_radians();
    let phi2 = lat_b.to_radians();
    let dphi = (lat_b - lat_a).to_radians();
    let dlambda = (lon_b - lon_a).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let distance = 2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt());

    let x = dlambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    let bearing = x.atan2(y).to_degrees();

    (bearing, distance)
}

/// Project a position along a bearing by a given distance.
///
/// Inverse of [`bearing_distance`]; used to place own-ship CPA points.
pub fn position_at(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_m / EARTH_RADIUS_M;

    let sin_lat2 = lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing.sin() * angular.sin() * lat1.cos();
    let x = angular.cos() - lat1.sin() * sin_lat2;
    let lon2 = (lon1 + y.atan2(x) + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI)
        - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Decompose a bearing/magnitude pair into (east, north) components.
pub fn east_north(bearing_deg: f64, magnitude: f64) -> (f64, f64) {
    let b = bearing_deg.to_radians();
    (magnitude * b.sin(), magnitude * b.cos())
}

/// Recombine (east, north) components into (track_deg in [0, 360), magnitude).
pub fn track_speed(east: f64, north: f64) -> (f64, f64) {
    let track = east.atan2(north).to_degrees().rem_euclid(360.0);
    (track, east.hypot(north))
}

/// Absolute difference between two angles in degrees, folded to [0, 180].
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Time to and separation at the closest point of approach.
///
/// The intruder sits at `distance_m` along `bearing_deg` from the own ship,
/// moving with relative velocity (`vrel_east`, `vrel_north`) = intruder
/// minus own. A relatively stationary pair never closes: that yields the
/// `T_NEVER` sentinel with separation unchanged instead of a blow-up.
/// `t_cpa` is negative when closest approach already happened.
pub fn cpa(distance_m: f64, bearing_deg: f64, vrel_east: f64, vrel_north: f64) -> (f64, f64) {
    let v2 = vrel_east * vrel_east + vrel_north * vrel_north;
    if v2 < REL_SPEED_SQ_FLOOR {
        return (T_NEVER, distance_m);
    }
    let (dx, dy) = east_north(bearing_deg, distance_m);
    let t_cpa = -(vrel_east * dx + vrel_north * dy) / v2;
    let dcpa2 = (distance_m * distance_m - t_cpa * t_cpa * v2).max(0.0);
    (t_cpa, dcpa2.sqrt())
}

/// Times at which the relative track enters and exits a circular protection
/// zone of `radius_m`, given the separation at CPA and the relative speed.
///
/// Returns `(T_NEVER, -T_NEVER)` when the track never penetrates the zone.
pub fn zone_crossing_times(
    dist_at_cpa: f64,
    radius_m: f64,
    t_cpa: f64,
    vrel_speed: f64,
) -> (f64, f64) {
    if dist_at_cpa >= radius_m || vrel_speed <= 0.0 {
        return (T_NEVER, -T_NEVER);
    }
    let half_chord = (radius_m * radius_m - dist_at_cpa * dist_at_cpa).sqrt();
    let dt = half_chord / vrel_speed;
    (t_cpa - dt, t_cpa + dt)
}

/// Times at which the relative altitude crosses into and out of the ±`dh`
/// band, given the current altitude difference `dalt` (intruder minus own)
/// and relative vertical rate `dvs`.
///
/// A near-zero rate is clamped to a small floor with its sign preserved, so
/// a co-altitude pair produces a band window that spans the whole horizon
/// rather than a division by zero.
pub fn vertical_crossing(dalt: f64, dh: f64, dvs: f64) -> (f64, f64) {
    let rate = if dvs.abs() < VERTICAL_RATE_FLOOR {
        if dvs == 0.0 {
            VERTICAL_RATE_FLOOR
        } else {
            VERTICAL_RATE_FLOOR.copysign(dvs)
        }
    } else {
        dvs
    };
    let t_hi = (dh - dalt) / rate;
    let t_lo = (-dh - dalt) / rate;
    (t_hi.min(t_lo), t_hi.max(t_lo))
}
