//! Conflict resolution via the Modified Voltage Potential method.
//!
//! Each conflict pair contributes a repulsive velocity correction pointing
//! away from the predicted closest point of approach, scaled so the pair
//! just clears the resolution zone. Corrections from multiple conflicts
//! accumulate per aircraft, are projected onto the allowed degrees of
//! freedom, and are clamped to the performance envelope before they become
//! guidance commands.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::{AsasConfig, PriorityPolicy, ResolutionDof};
use crate::detect::{ConflictPair, Detection};
use crate::geometry::{east_north, track_speed};
use crate::lifecycle::{LifecycleTracker, PairKey};
use crate::traffic::{AircraftState, Traffic};

/// Minimum predicted miss distance before the head-on escape kicks in [m].
const HEAD_ON_CLAMP_M: f64 = 10.0;

/// Floor on |t_cpa| in the correction denominator [s].
const MIN_TCPA_S: f64 = 1e-3;

/// Below this vertical speed an aircraft counts as cruising [m/s].
const CRUISE_VS_MPS: f64 = 0.1;

/// Per-aircraft guidance for one ASAS cycle. `None` fields follow the
/// autopilot; commands are overwritten every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResolutionCommand {
    pub track_deg: Option<f64>,
    pub ground_speed_mps: Option<f64>,
    pub vertical_speed_mps: Option<f64>,
    pub altitude_m: Option<f64>,
}

impl ResolutionCommand {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-aircraft exemption lists.
///
/// `no_avoidance` aircraft are never avoided by others (they still avoid
/// everyone else); `resolution_off` aircraft never maneuver themselves.
/// Both sets are idempotent under add/remove.
#[derive(Debug, Default)]
pub struct Exemptions {
    no_avoidance: HashSet<String>,
    resolution_off: HashSet<String>,
}

impl Exemptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_no_avoidance(&mut self, id: &str, on: bool) {
        if on {
            self.no_avoidance.insert(id.to_string());
        } else {
            self.no_avoidance.remove(id);
        }
    }

    pub fn is_no_avoidance(&self, id: &str) -> bool {
        self.no_avoidance.contains(id)
    }

    pub fn set_resolution_off(&mut self, id: &str, on: bool) {
        if on {
            self.resolution_off.insert(id.to_string());
        } else {
            self.resolution_off.remove(id);
        }
    }

    pub fn is_resolution_off(&self, id: &str) -> bool {
        self.resolution_off.contains(id)
    }

    pub fn clear(&mut self) {
        self.no_avoidance.clear();
        self.resolution_off.clear();
    }
}

/// A conflict-resolution algorithm. Returns one command per traffic slot;
/// an all-`None` command means the aircraft follows its autopilot.
pub trait ConflictResolver {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        det: &Detection,
        traf: &dyn Traffic,
        cfg: &AsasConfig,
        tracker: &LifecycleTracker,
        exemptions: &Exemptions,
    ) -> Vec<ResolutionCommand>;
}

/// Resolution switched off: everything follows the autopilot.
#[derive(Debug, Default)]
pub struct NoResolver;

impl ConflictResolver for NoResolver {
    fn name(&self) -> &'static str {
        "OFF"
    }

    fn resolve(
        &self,
        _det: &Detection,
        traf: &dyn Traffic,
        _cfg: &AsasConfig,
        _tracker: &LifecycleTracker,
        _exemptions: &Exemptions,
    ) -> Vec<ResolutionCommand> {
        vec![ResolutionCommand::default(); traf.count()]
    }
}

/// The Modified Voltage Potential resolver.
#[derive(Debug, Default)]
pub struct MvpResolver;

impl MvpResolver {
    pub fn new() -> Self {
        Self
    }

    /// Velocity correction for one pair, from the own ship's perception.
    ///
    /// The returned vector is subtracted from the own ship's velocity and
    /// (in a symmetric pass) added to the intruder's, pushing the predicted
    /// CPA out to the resolution zone. |t_cpa| appears in the denominator
    /// because it goes negative during an intrusion.
    fn correction(
        own: &AircraftState,
        intr: &AircraftState,
        pair: &ConflictPair,
        cfg: &AsasConfig,
    ) -> [f64; 3] {
        let (dx, dy) = east_north(pair.bearing_deg, pair.distance_m);
        let dalt = intr.alt_m - own.alt_m;
        let vrel = [
            intr.gs_east - own.gs_east,
            intr.gs_north - own.gs_north,
            intr.vs_mps - own.vs_mps,
        ];

        let mut dcpa = [dx + vrel[0] * pair.t_cpa, dy + vrel[1] * pair.t_cpa];
        let mut miss = dcpa[0].hypot(dcpa[1]);
        let intrusion_h = cfg.resolution_radius_m - miss;

        // Dead-center geometry has no preferred escape direction; nudge it
        // off-axis so the division below stays finite.
        if miss <= HEAD_ON_CLAMP_M {
            miss = HEAD_ON_CLAMP_M;
            dcpa = [HEAD_ON_CLAMP_M, HEAD_ON_CLAMP_M];
        }

        let t = pair.t_cpa.abs().max(MIN_TCPA_S);
        let mut dv_east = intrusion_h * dcpa[0] / (t * miss);
        let mut dv_north = intrusion_h * dcpa[1] / (t * miss);

        // While the intruder is still outside the zone, widen the push so
        // the resolved track does not graze the zone tangentially.
        if cfg.resolution_radius_m < pair.distance_m && miss < pair.distance_m {
            let secant = ((cfg.resolution_radius_m / pair.distance_m).asin()
                - (miss / pair.distance_m).asin())
            .cos();
            if secant.abs() > f64::EPSILON {
                dv_east /= secant;
                dv_north /= secant;
            }
        }

        // Vertical: the aircraft with the higher climb/descent rate eases
        // off; with no relative rate, push apart along the altitude offset.
        let converging_vertically = vrel[2].abs() > 0.0;
        let intrusion_v = if converging_vertically {
            cfg.resolution_height_m
        } else {
            cfg.resolution_height_m - dalt
        };
        let dv_up = if converging_vertically {
            (intrusion_v / pair.tsolve_v) * (-vrel[2].signum())
        } else {
            intrusion_v / pair.tsolve_v
        };

        [dv_east, dv_north, dv_up]
    }

    fn apply_priority(
        policy: PriorityPolicy,
        dv_mvp: [f64; 3],
        dv_own: &mut [f64; 3],
        dv_intr: &mut [f64; 3],
        own_vs: f64,
        intr_vs: f64,
    ) {
        let own_cruising = own_vs.abs() < CRUISE_VS_MPS;
        let intr_cruising = intr_vs.abs() < CRUISE_VS_MPS;
        let sub = |dv: &mut [f64; 3]| {
            for k in 0..3 {
                dv[k] -= dv_mvp[k];
            }
        };
        let add = |dv: &mut [f64; 3]| {
            for k in 0..3 {
                dv[k] += dv_mvp[k];
            }
        };

        match policy {
            PriorityPolicy::FreeFlightPrimary => {
                sub(dv_own);
                add(dv_intr);
            }
            PriorityPolicy::FreeFlightSecondary => {
                if own_cruising && !intr_cruising {
                    add(dv_intr);
                } else if intr_cruising && !own_cruising {
                    sub(dv_own);
                } else {
                    sub(dv_own);
                    add(dv_intr);
                }
            }
            PriorityPolicy::FreeFlightTertiary => {
                if own_cruising && !intr_cruising {
                    sub(dv_own);
                    dv_own[2] = 0.0;
                } else if intr_cruising && !own_cruising {
                    add(dv_intr);
                    dv_intr[2] = 0.0;
                } else {
                    sub(dv_own);
                    add(dv_intr);
                }
            }
            PriorityPolicy::LayersPrimary => {
                if own_cruising && !intr_cruising {
                    add(dv_intr);
                    dv_intr[2] = 0.0;
                } else if intr_cruising && !own_cruising {
                    sub(dv_own);
                    dv_own[2] = 0.0;
                } else {
                    sub(dv_own);
                    add(dv_intr);
                    dv_own[2] = 0.0;
                    dv_intr[2] = 0.0;
                }
            }
            PriorityPolicy::LayersSecondary => {
                if own_cruising && !intr_cruising {
                    sub(dv_own);
                    dv_own[2] = 0.0;
                } else if intr_cruising && !own_cruising {
                    add(dv_intr);
                    dv_intr[2] = 0.0;
                } else {
                    sub(dv_own);
                    add(dv_intr);
                    dv_own[2] = 0.0;
                    dv_intr[2] = 0.0;
                }
            }
        }
    }

    /// Turn an accumulated correction into a guidance command, restricted
    /// to the allowed degrees of freedom and clamped to the envelope.
    fn command_for(
        state: &AircraftState,
        dv: [f64; 3],
        t_in_min: f64,
        tsolve_v_min: f64,
        traf: &dyn Traffic,
        slot: usize,
        cfg: &AsasConfig,
    ) -> ResolutionCommand {
        let new_east = state.gs_east + dv[0];
        let new_north = state.gs_north + dv[1];
        let new_vs = state.vs_mps + dv[2];

        let (res_track, res_gs) = track_speed(new_east, new_north);
        let (track, gs, vs) = match cfg.dof {
            ResolutionDof::Combined => (res_track, res_gs, new_vs),
            ResolutionDof::HorizontalBoth => (res_track, res_gs, state.vs_mps),
            ResolutionDof::HorizontalSpeed => (state.track_deg, res_gs, state.vs_mps),
            ResolutionDof::HorizontalHeading => (res_track, state.ground_speed(), state.vs_mps),
            ResolutionDof::Vertical => (state.track_deg, state.ground_speed(), new_vs),
        };

        let gs = gs.clamp(cfg.vmin_mps, cfg.vmax_mps);
        let vs = vs.clamp(cfg.vsmin_mps, cfg.vsmax_mps);

        // The altitude target is only meaningful while the aircraft is in a
        // predicted conflict: ride the commanded vertical speed for the
        // vertical solve time, capped at the lookahead so a near-zero
        // relative vertical rate cannot command an absurd altitude.
        // Horizontal-only resolution keeps the autopilot's altitude so the
        // vertical channel stays untouched.
        let altitude_m = if cfg.dof.horizontal_only() {
            traf.autopilot_altitude(slot)
        } else if t_in_min < cfg.lookahead_s {
            state.alt_m + vs * tsolve_v_min.min(cfg.lookahead_s)
        } else {
            state.alt_m
        };

        ResolutionCommand {
            track_deg: Some(track),
            ground_speed_mps: Some(gs),
            vertical_speed_mps: Some(vs),
            altitude_m: Some(altitude_m),
        }
    }
}

impl ConflictResolver for MvpResolver {
    fn name(&self) -> &'static str {
        "MVP"
    }

    fn resolve(
        &self,
        det: &Detection,
        traf: &dyn Traffic,
        cfg: &AsasConfig,
        tracker: &LifecycleTracker,
        exemptions: &Exemptions,
    ) -> Vec<ResolutionCommand> {
        let n = traf.count();
        let mut dv = vec![[0.0f64; 3]; n];
        let mut touched = vec![false; n];
        let mut processed: HashSet<PairKey> = HashSet::new();

        for pair in &det.pairs {
            let key = PairKey::new(&pair.own_id, &pair.intruder_id);
            // A symmetric pass reports both orderings of every pair; one
            // correction serves both aircraft.
            if det.symmetric && !processed.insert(key.clone()) {
                continue;
            }
            let (own, intr) = match (traf.state(pair.own), traf.state(pair.intruder)) {
                (Some(own), Some(intr)) => (own, intr),
                _ => continue,
            };

            let dv_mvp = if tracker.is_spawn_exempt(&key) {
                [0.0; 3]
            } else {
                Self::correction(own, intr, pair, cfg)
            };

            if det.symmetric {
                let (mut dv_own, mut dv_intr) = (dv[pair.own], dv[pair.intruder]);
                match cfg.priority {
                    Some(policy) => Self::apply_priority(
                        policy,
                        dv_mvp,
                        &mut dv_own,
                        &mut dv_intr,
                        own.vs_mps,
                        intr.vs_mps,
                    ),
                    None => {
                        for k in 0..3 {
                            dv_own[k] -= dv_mvp[k];
                            dv_intr[k] += dv_mvp[k];
                        }
                    }
                }
                // Nobody avoids a no-avoidance aircraft; undo that share.
                if exemptions.is_no_avoidance(&pair.own_id) {
                    for k in 0..3 {
                        dv_intr[k] -= dv_mvp[k];
                    }
                }
                if exemptions.is_no_avoidance(&pair.intruder_id) {
                    for k in 0..3 {
                        dv_own[k] += dv_mvp[k];
                    }
                }
                dv[pair.own] = dv_own;
                dv[pair.intruder] = dv_intr;
                touched[pair.own] = true;
                touched[pair.intruder] = true;
            } else {
                // Degraded perception: each aircraft only trusts its own
                // picture, so only the receiving side maneuvers.
                let mut dv_own = dv[pair.own];
                let mut dv_intr = [0.0; 3];
                match cfg.priority {
                    Some(policy) => Self::apply_priority(
                        policy,
                        dv_mvp,
                        &mut dv_own,
                        &mut dv_intr,
                        own.vs_mps,
                        intr.vs_mps,
                    ),
                    None => {
                        for k in 0..3 {
                            dv_own[k] -= dv_mvp[k];
                        }
                    }
                }
                if exemptions.is_no_avoidance(&pair.intruder_id) {
                    for k in 0..3 {
                        dv_own[k] += dv_mvp[k];
                    }
                }
                dv[pair.own] = dv_own;
                touched[pair.own] = true;
            }
        }

        let mut commands = vec![ResolutionCommand::default(); n];
        for slot in 0..n {
            if !touched[slot] {
                continue;
            }
            let state = match traf.state(slot) {
                Some(state) => state,
                None => continue,
            };
            if exemptions.is_resolution_off(&state.id) {
                continue;
            }
            let t_in_min = det.t_in_min.get(slot).copied().unwrap_or(f64::INFINITY);
            let tsolve_v_min = det.tsolve_v_min.get(slot).copied().unwrap_or(0.0);
            commands[slot] =
                Self::command_for(state, dv[slot], t_in_min, tsolve_v_min, traf, slot, cfg);
        }
        commands
    }
}
