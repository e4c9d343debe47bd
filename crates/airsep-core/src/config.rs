//! Runtime-mutable configuration for the CD&R engine.
//!
//! Every setter validates at the boundary and leaves state unchanged on
//! error; dependent values (the resolution zone) are re-derived whenever
//! one of their inputs changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::areas::AreaRegistry;
use crate::geometry::{FPM, NM};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown conflict detection method `{0}`")]
    UnknownDetector(String),
    #[error("unknown conflict resolution method `{0}`")]
    UnknownResolver(String),
    #[error("unknown priority code `{0}` (expected FF1, FF2, FF3, LAY1 or LAY2)")]
    UnknownPriorityCode(String),
    #[error("unknown area filter code `{0}` (expected OPTION1..OPTION6)")]
    UnknownAreaPolicy(String),
    #[error("area `{0}` has not been defined")]
    UnknownArea(String),
    #[error("resolution zone ({got} m) may not be smaller than the protection zone ({min} m)")]
    ResolutionZoneTooSmall { got: f64, min: f64 },
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{0}")]
    InvalidRange(&'static str),
}

/// How aircraft perceive each other during detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SensorMode {
    /// Ground truth; pairwise geometry is symmetric and a single matrix
    /// pass suffices.
    Truth,
    /// Simulated broadcast channel: each receiver perceives every intruder
    /// through independent zero-mean Gaussian noise, so the perceived
    /// geometry is not symmetric and resolution is unilateral.
    Broadcast {
        sigma_bearing_deg: f64,
        sigma_range_m: f64,
        sigma_alt_m: f64,
        sigma_vs_mps: f64,
    },
}

/// Degrees of freedom the resolver may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDof {
    /// Horizontal and vertical combined (default).
    Combined,
    /// Horizontal only, both speed and heading.
    HorizontalBoth,
    /// Horizontal only, speed changes only.
    HorizontalSpeed,
    /// Horizontal only, heading changes only.
    HorizontalHeading,
    /// Vertical speed only.
    Vertical,
}

impl ResolutionDof {
    pub fn horizontal_only(self) -> bool {
        matches!(
            self,
            ResolutionDof::HorizontalBoth
                | ResolutionDof::HorizontalSpeed
                | ResolutionDof::HorizontalHeading
        )
    }
}

/// Priority rules for who bears a pairwise resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityPolicy {
    /// FF1: no priority, the correction is split equally and oppositely.
    FreeFlightPrimary,
    /// FF2: cruising aircraft has priority, the climbing/descending one solves.
    FreeFlightSecondary,
    /// FF3: climbing/descending has priority, the cruiser solves horizontally.
    FreeFlightTertiary,
    /// LAY1: cruising has priority; all resolutions horizontal.
    LayersPrimary,
    /// LAY2: climbing/descending has priority; all resolutions horizontal.
    LayersSecondary,
}

impl PriorityPolicy {
    pub fn from_code(code: &str) -> Result<Self, ConfigError> {
        match code.to_ascii_uppercase().as_str() {
            "FF1" => Ok(PriorityPolicy::FreeFlightPrimary),
            "FF2" => Ok(PriorityPolicy::FreeFlightSecondary),
            "FF3" => Ok(PriorityPolicy::FreeFlightTertiary),
            "LAY1" => Ok(PriorityPolicy::LayersPrimary),
            "LAY2" => Ok(PriorityPolicy::LayersSecondary),
            other => Err(ConfigError::UnknownPriorityCode(other.to_string())),
        }
    }
}

/// Which geometric conflicts inside/near a named area are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaFilterPolicy {
    /// OPTION1: both CPA points inside the area.
    CpaBoth,
    /// OPTION2: both CPA points and at least one aircraft inside.
    CpaBothOneAircraft,
    /// OPTION3: both CPA points and both aircraft inside.
    CpaBothBothAircraft,
    /// OPTION4: either CPA point inside.
    CpaEither,
    /// OPTION5: either aircraft inside.
    AircraftEither,
    /// OPTION6: any of the four points inside.
    Any,
}

impl AreaFilterPolicy {
    pub fn from_code(code: &str) -> Result<Self, ConfigError> {
        match code.to_ascii_uppercase().as_str() {
            "OPTION1" => Ok(AreaFilterPolicy::CpaBoth),
            "OPTION2" => Ok(AreaFilterPolicy::CpaBothOneAircraft),
            "OPTION3" => Ok(AreaFilterPolicy::CpaBothBothAircraft),
            "OPTION4" => Ok(AreaFilterPolicy::CpaEither),
            "OPTION5" => Ok(AreaFilterPolicy::AircraftEither),
            "OPTION6" => Ok(AreaFilterPolicy::Any),
            other => Err(ConfigError::UnknownAreaPolicy(other.to_string())),
        }
    }
}

/// CD&R engine configuration. Fields are public for reading; mutate through
/// the setters so dependent values stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsasConfig {
    /// Master switch for the whole detect/track/resolve pipeline.
    pub enabled: bool,
    /// Horizontal separation minimum for detection [m].
    pub detection_radius_m: f64,
    /// Vertical separation half-height for detection [m].
    pub vertical_half_height_m: f64,
    /// Safety margin factor; resolution zone = detection zone × margin.
    pub margin: f64,
    /// Horizontal separation minimum for resolution [m] (derived).
    pub resolution_radius_m: f64,
    /// Vertical half-height for resolution [m] (derived).
    pub resolution_height_m: f64,
    /// Lookahead horizon for conflict prediction [s].
    pub lookahead_s: f64,
    /// Interval between CD&R runs in simulation time [s].
    pub interval_s: f64,
    /// Ground-speed envelope for resolution commands [m/s].
    pub vmin_mps: f64,
    pub vmax_mps: f64,
    /// Vertical-speed envelope for resolution commands [m/s].
    pub vsmin_mps: f64,
    pub vsmax_mps: f64,
    pub dof: ResolutionDof,
    /// Priority rules; `None` means the default equal-and-opposite split.
    pub priority: Option<PriorityPolicy>,
    /// Conflict-area filter: policy plus the name of the registered area.
    pub area_filter: Option<(AreaFilterPolicy, String)>,
    /// New conflicts with `t_in` below this fraction of the lookahead that
    /// involve a freshly created aircraft are tracked but not resolved.
    pub spawn_check_factor: f64,
    /// Heading-difference threshold for the bouncing-conflict heuristic [deg].
    pub bouncing_angle_deg: f64,
    pub sensor: SensorMode,
}

impl Default for AsasConfig {
    fn default() -> Self {
        let detection_radius_m = 5.0 * NM;
        let vertical_half_height_m = 1000.0 * crate::geometry::FT;
        let margin = 1.05;
        Self {
            enabled: true,
            detection_radius_m,
            vertical_half_height_m,
            margin,
            resolution_radius_m: detection_radius_m * margin,
            resolution_height_m: vertical_half_height_m * margin,
            lookahead_s: 300.0,
            interval_s: 1.0,
            vmin_mps: 51.4,
            vmax_mps: 308.6,
            vsmin_mps: -3000.0 * FPM,
            vsmax_mps: 3000.0 * FPM,
            dof: ResolutionDof::Combined,
            priority: None,
            area_filter: None,
            spawn_check_factor: 0.1,
            bouncing_angle_deg: 15.0,
            sensor: SensorMode::Truth,
        }
    }
}

impl AsasConfig {
    pub fn set_detection_radius(&mut self, radius_m: f64) -> Result<(), ConfigError> {
        if radius_m <= 0.0 {
            return Err(ConfigError::NotPositive("detection radius"));
        }
        self.detection_radius_m = radius_m;
        self.resolution_radius_m = radius_m * self.margin;
        Ok(())
    }

    pub fn set_vertical_half_height(&mut self, dh_m: f64) -> Result<(), ConfigError> {
        if dh_m <= 0.0 {
            return Err(ConfigError::NotPositive("vertical half-height"));
        }
        self.vertical_half_height_m = dh_m;
        self.resolution_height_m = dh_m * self.margin;
        Ok(())
    }

    pub fn set_margin(&mut self, margin: f64) -> Result<(), ConfigError> {
        if margin < 1.0 {
            return Err(ConfigError::ResolutionZoneTooSmall {
                got: self.detection_radius_m * margin,
                min: self.detection_radius_m,
            });
        }
        self.margin = margin;
        self.resolution_radius_m = self.detection_radius_m * margin;
        self.resolution_height_m = self.vertical_half_height_m * margin;
        Ok(())
    }

    /// Set the resolution radius directly; it may not undercut detection.
    pub fn set_resolution_radius(&mut self, radius_m: f64) -> Result<(), ConfigError> {
        if radius_m < self.detection_radius_m {
            return Err(ConfigError::ResolutionZoneTooSmall {
                got: radius_m,
                min: self.detection_radius_m,
            });
        }
        self.resolution_radius_m = radius_m;
        Ok(())
    }

    pub fn set_resolution_height(&mut self, dh_m: f64) -> Result<(), ConfigError> {
        if dh_m < self.vertical_half_height_m {
            return Err(ConfigError::ResolutionZoneTooSmall {
                got: dh_m,
                min: self.vertical_half_height_m,
            });
        }
        self.resolution_height_m = dh_m;
        Ok(())
    }

    pub fn set_lookahead(&mut self, seconds: f64) -> Result<(), ConfigError> {
        if seconds <= 0.0 {
            return Err(ConfigError::NotPositive("lookahead"));
        }
        self.lookahead_s = seconds;
        Ok(())
    }

    pub fn set_interval(&mut self, seconds: f64) -> Result<(), ConfigError> {
        if seconds <= 0.0 {
            return Err(ConfigError::NotPositive("update interval"));
        }
        self.interval_s = seconds;
        Ok(())
    }

    pub fn set_speed_envelope(&mut self, vmin: f64, vmax: f64) -> Result<(), ConfigError> {
        if vmin <= 0.0 {
            return Err(ConfigError::NotPositive("minimum speed"));
        }
        if vmax <= vmin {
            return Err(ConfigError::InvalidRange("vmax must exceed vmin"));
        }
        self.vmin_mps = vmin;
        self.vmax_mps = vmax;
        Ok(())
    }

    pub fn set_vertical_speed_envelope(&mut self, vsmin: f64, vsmax: f64) -> Result<(), ConfigError> {
        if vsmax <= vsmin {
            return Err(ConfigError::InvalidRange("vsmax must exceed vsmin"));
        }
        self.vsmin_mps = vsmin;
        self.vsmax_mps = vsmax;
        Ok(())
    }

    /// Enable priority rules from a code like "FF2", or disable with `None`.
    pub fn set_priority(&mut self, code: Option<&str>) -> Result<(), ConfigError> {
        self.priority = match code {
            Some(code) => Some(PriorityPolicy::from_code(code)?),
            None => None,
        };
        Ok(())
    }

    /// Enable the conflict-area filter. The named area must already exist
    /// in the registry.
    pub fn set_area_filter(
        &mut self,
        selection: Option<(&str, &str)>,
        registry: &AreaRegistry,
    ) -> Result<(), ConfigError> {
        self.area_filter = match selection {
            Some((code, area)) => {
                let policy = AreaFilterPolicy::from_code(code)?;
                if !registry.contains(area) {
                    return Err(ConfigError::UnknownArea(area.to_string()));
                }
                Some((policy, area.to_string()))
            }
            None => None,
        };
        Ok(())
    }

    pub fn set_spawn_check_factor(&mut self, factor: f64) -> Result<(), ConfigError> {
        if factor < 0.0 {
            return Err(ConfigError::InvalidRange("spawn-check factor must be >= 0"));
        }
        self.spawn_check_factor = factor;
        Ok(())
    }

    pub fn set_bouncing_angle(&mut self, degrees: f64) -> Result<(), ConfigError> {
        if !(0.0..=180.0).contains(&degrees) {
            return Err(ConfigError::InvalidRange(
                "bouncing angle must be within 0..=180 degrees",
            ));
        }
        self.bouncing_angle_deg = degrees;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_change_rederives_resolution_zone() {
        let mut cfg = AsasConfig::default();
        cfg.set_detection_radius(10_000.0).unwrap();
        assert!((cfg.resolution_radius_m - 10_000.0 * cfg.margin).abs() < 1e-9);
    }

    #[test]
    fn resolution_radius_may_not_undercut_detection() {
        let mut cfg = AsasConfig::default();
        let before = cfg.resolution_radius_m;
        let err = cfg.set_resolution_radius(cfg.detection_radius_m - 1.0);
        assert!(matches!(
            err,
            Err(ConfigError::ResolutionZoneTooSmall { .. })
        ));
        assert_eq!(cfg.resolution_radius_m, before);
    }

    #[test]
    fn margin_below_one_rejected() {
        let mut cfg = AsasConfig::default();
        assert!(cfg.set_margin(0.9).is_err());
        assert!((cfg.margin - 1.05).abs() < 1e-12);
    }

    #[test]
    fn priority_codes_parse() {
        assert_eq!(
            PriorityPolicy::from_code("lay2").unwrap(),
            PriorityPolicy::LayersSecondary
        );
        assert!(PriorityPolicy::from_code("FF9").is_err());
    }

    #[test]
    fn area_filter_requires_registered_area() {
        let mut cfg = AsasConfig::default();
        let registry = AreaRegistry::new();
        let err = cfg.set_area_filter(Some(("OPTION1", "NOWHERE")), &registry);
        assert!(matches!(err, Err(ConfigError::UnknownArea(_))));
        assert!(cfg.area_filter.is_none());

        registry.define(
            "SECTOR",
            crate::areas::AreaShape::Circle {
                lat: 0.0,
                lon: 0.0,
                radius_m: 50_000.0,
                floor_m: 0.0,
                ceiling_m: 1e9,
            },
        );
        cfg.set_area_filter(Some(("OPTION6", "SECTOR")), &registry)
            .unwrap();
        assert_eq!(
            cfg.area_filter,
            Some((AreaFilterPolicy::Any, "SECTOR".to_string()))
        );
    }

    #[test]
    fn config_survives_json_round_trip() {
        let mut cfg = AsasConfig::default();
        cfg.set_priority(Some("FF2")).unwrap();
        cfg.sensor = SensorMode::Broadcast {
            sigma_bearing_deg: 0.5,
            sigma_range_m: 50.0,
            sigma_alt_m: 10.0,
            sigma_vs_mps: 0.2,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AsasConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.priority, Some(PriorityPolicy::FreeFlightSecondary));
        assert_eq!(back.sensor, cfg.sensor);
        assert!((back.resolution_radius_m - cfg.resolution_radius_m).abs() < 1e-9);
    }

    #[test]
    fn speed_envelope_validation() {
        let mut cfg = AsasConfig::default();
        assert!(cfg.set_speed_envelope(100.0, 50.0).is_err());
        assert!(cfg.set_speed_envelope(60.0, 250.0).is_ok());
    }
}
