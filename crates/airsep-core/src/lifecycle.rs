//! Conflict and loss-of-separation bookkeeping across detection cycles.
//!
//! Detection is memoryless; this module is the memory. Every perceived pair
//! is folded into a canonical-keyed record map, so `(A, B)` and `(B, A)`
//! always land on the same record and re-detections update rather than
//! duplicate. Records outlive detection: a pair stays open until its true
//! geometry says the encounter is over, which is also what drives handing
//! guidance back to the autopilot.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::AsasConfig;
use crate::detect::{CpaPoint, Detection};
use crate::geometry::{bearing_distance, east_north};
use crate::traffic::Traffic;

/// Order-independent identifier for an aircraft pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PairKey {
    pub first: String,
    pub second: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                first: a.to_string(),
                second: b.to_string(),
            }
        } else {
            Self {
                first: b.to_string(),
                second: a.to_string(),
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.first == id || self.second == id
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// An open predicted conflict.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub key: PairKey,
    pub t_start: f64,
    pub t_last_seen: f64,
    /// Predicted time to closest approach, refreshed every cycle the pair
    /// is re-detected [s].
    pub t_cpa: f64,
    /// Predicted CPA point of `key.first`, refreshed with `t_cpa`.
    pub first_cpa: CpaPoint,
    /// Predicted CPA point of `key.second`, refreshed with `t_cpa`.
    pub second_cpa: CpaPoint,
    /// Tracked but never resolved: the pair appeared implausibly close to
    /// one aircraft's creation.
    pub spawn_exempt: bool,
}

/// An open actual loss of separation.
#[derive(Debug, Clone, Serialize)]
pub struct LosRecord {
    pub key: PairKey,
    pub t_start: f64,
    pub t_last_seen: f64,
    /// Worst combined intrusion severity seen so far.
    pub max_severity: f64,
    /// Horizontal intrusion fraction at the combined peak.
    pub max_h_severity: f64,
    /// Vertical intrusion fraction at the combined peak.
    pub max_v_severity: f64,
    /// Whether the peak severity has been logged yet.
    logged: bool,
}

/// Intrusion severity of an ongoing LOS as (combined, horizontal,
/// vertical). Each component is the fraction of the separation minimum
/// given up; the combined value is the weaker of the two, at most 1
/// (full collision course).
fn los_severity(h_sep_m: f64, v_sep_m: f64, cfg: &AsasConfig) -> (f64, f64, f64) {
    let h = 1.0 - h_sep_m / cfg.detection_radius_m;
    let v = 1.0 - v_sep_m / cfg.vertical_half_height_m;
    (h.min(v), h, v)
}

/// Record maps plus the per-aircraft resolution-authority set.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    conflicts: HashMap<PairKey, ConflictRecord>,
    losses: HashMap<PairKey, LosRecord>,
    /// Aircraft currently under resolution authority.
    active: HashSet<String>,
    /// Aircraft created since their last conflict-free cycle.
    recently_created: HashSet<String>,
    total_conflicts: u64,
    total_losses: u64,
    los_logged_events: u64,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created aircraft for the spawn check.
    pub fn note_created(&mut self, id: &str) {
        self.recently_created.insert(id.to_string());
    }

    /// Drop all state tied to a deleted aircraft. Its open records close on
    /// the next sweep, when the slot lookup fails.
    pub fn note_deleted(&mut self, id: &str) {
        self.active.remove(id);
        self.recently_created.remove(id);
    }

    /// Whether this aircraft currently holds resolution authority.
    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Whether this pair is tracked but exempt from resolution.
    pub fn is_spawn_exempt(&self, key: &PairKey) -> bool {
        self.conflicts
            .get(key)
            .map(|rec| rec.spawn_exempt)
            .unwrap_or(false)
    }

    pub fn open_conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.values()
    }

    pub fn open_losses(&self) -> impl Iterator<Item = &LosRecord> {
        self.losses.values()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    pub fn los_count(&self) -> usize {
        self.losses.len()
    }

    /// Total conflict records ever opened.
    pub fn total_conflicts(&self) -> u64 {
        self.total_conflicts
    }

    /// Total LOS records ever opened.
    pub fn total_losses(&self) -> u64 {
        self.total_losses
    }

    /// Number of LOS events whose peak severity has been logged. Each LOS
    /// logs exactly once: at the first sample where severity stops rising,
    /// or at close if it rose until the very end.
    pub fn los_logged_events(&self) -> u64 {
        self.los_logged_events
    }

    /// Fold one detection pass into the record maps and grant authority.
    pub fn observe(&mut self, det: &Detection, cfg: &AsasConfig, simt: f64) {
        let mut conflict_free: HashSet<&str> = self
            .recently_created
            .iter()
            .map(String::as_str)
            .collect();

        for pair in &det.pairs {
            conflict_free.remove(pair.own_id.as_str());
            conflict_free.remove(pair.intruder_id.as_str());
            let key = PairKey::new(&pair.own_id, &pair.intruder_id);

            if pair.t_in >= 0.0 && pair.t_out >= 0.0 {
                // CPA points in canonical key order.
                let (first_cpa, second_cpa) = if pair.own_id == key.first {
                    (pair.own_cpa, pair.intruder_cpa)
                } else {
                    (pair.intruder_cpa, pair.own_cpa)
                };
                match self.conflicts.get_mut(&key) {
                    Some(rec) => {
                        rec.t_last_seen = simt;
                        rec.t_cpa = pair.t_cpa;
                        rec.first_cpa = first_cpa;
                        rec.second_cpa = second_cpa;
                    }
                    None => {
                        // A brand-new pair right on top of a just-spawned
                        // aircraft is a scenario artifact, not an encounter.
                        let spawn_exempt = pair.t_in
                            < cfg.spawn_check_factor * cfg.lookahead_s
                            && (self.recently_created.contains(&pair.own_id)
                                || self.recently_created.contains(&pair.intruder_id));
                        tracing::info!(pair = %key, t_in = pair.t_in, spawn_exempt, "conflict opened");
                        self.total_conflicts += 1;
                        self.conflicts.insert(
                            key.clone(),
                            ConflictRecord {
                                key: key.clone(),
                                t_start: simt,
                                t_last_seen: simt,
                                t_cpa: pair.t_cpa,
                                first_cpa,
                                second_cpa,
                                spawn_exempt,
                            },
                        );
                    }
                }
            }

            if pair.is_los() {
                let (severity, h_severity, v_severity) =
                    los_severity(pair.horizontal_sep_m, pair.vertical_sep_m, cfg);
                match self.losses.get_mut(&key) {
                    Some(rec) => {
                        rec.t_last_seen = simt;
                        if severity >= rec.max_severity {
                            rec.max_severity = severity;
                            rec.max_h_severity = h_severity;
                            rec.max_v_severity = v_severity;
                        } else if !rec.logged {
                            // First sample past the peak: the maximum is in.
                            tracing::info!(
                                pair = %rec.key,
                                max_severity = rec.max_severity,
                                max_h_severity = rec.max_h_severity,
                                max_v_severity = rec.max_v_severity,
                                "loss of separation peaked"
                            );
                            rec.logged = true;
                            self.los_logged_events += 1;
                        }
                    }
                    None => {
                        tracing::warn!(pair = %key, severity, "loss of separation");
                        self.total_losses += 1;
                        self.losses.insert(
                            key.clone(),
                            LosRecord {
                                key: key.clone(),
                                t_start: simt,
                                t_last_seen: simt,
                                max_severity: severity,
                                max_h_severity: h_severity,
                                max_v_severity: v_severity,
                                logged: false,
                            },
                        );
                    }
                }
            }
        }

        // A cycle with no conflicts at all ends the spawn-check window.
        let cleared: Vec<String> = conflict_free.iter().map(|s| s.to_string()).collect();
        for id in cleared {
            self.recently_created.remove(&id);
        }

        // Authority goes to every aircraft in a non-exempt open record that
        // was confirmed this cycle.
        for rec in self.conflicts.values() {
            if rec.t_last_seen == simt && !rec.spawn_exempt {
                self.active.insert(rec.key.first.clone());
                self.active.insert(rec.key.second.clone());
            }
        }
        for rec in self.losses.values() {
            if rec.t_last_seen == simt {
                self.active.insert(rec.key.first.clone());
                self.active.insert(rec.key.second.clone());
            }
        }
    }

    /// Close records whose encounters are over and hand guidance back.
    ///
    /// A conflict is over when the pair is past CPA, horizontally clear of
    /// the protection zone, and not in a bouncing geometry (near-parallel
    /// tracks still inside the resolution zone keep re-triggering as both
    /// aircraft turn the same way). A LOS is over when true separation is
    /// regained; a peak that was still rising at that point is logged here.
    pub fn sweep(&mut self, traf: &mut dyn Traffic, cfg: &AsasConfig, simt: f64) {
        let mut closed_conflicts: Vec<PairKey> = Vec::new();
        let mut still_active: HashSet<String> = HashSet::new();

        for rec in self.conflicts.values() {
            let over = match pair_states(traf, &rec.key) {
                Some((own, intr)) => {
                    let (qdr, dist) = bearing_distance(own.lat, own.lon, intr.lat, intr.lon);
                    let (dx, dy) = east_north(qdr, dist);
                    let vrel_east = intr.gs_east - own.gs_east;
                    let vrel_north = intr.gs_north - own.gs_north;
                    let past_cpa = dx * vrel_east + dy * vrel_north > 0.0;
                    let clear = dist > cfg.detection_radius_m;
                    let bouncing = crate::geometry::angle_diff_deg(own.track_deg, intr.track_deg)
                        < cfg.bouncing_angle_deg
                        && dist < cfg.resolution_radius_m;
                    past_cpa && clear && !bouncing
                }
                // One side was deleted; nothing left to separate.
                None => true,
            };

            if over {
                closed_conflicts.push(rec.key.clone());
            } else if !rec.spawn_exempt {
                still_active.insert(rec.key.first.clone());
                still_active.insert(rec.key.second.clone());
            }
        }
        for key in &closed_conflicts {
            tracing::info!(pair = %key, "conflict closed");
            self.conflicts.remove(key);
        }

        let mut closed_losses: Vec<PairKey> = Vec::new();
        for rec in self.losses.values() {
            let over = match pair_states(traf, &rec.key) {
                Some((own, intr)) => {
                    let (_, dist) = bearing_distance(own.lat, own.lon, intr.lat, intr.lon);
                    let v_sep = (own.alt_m - intr.alt_m).abs();
                    dist >= cfg.detection_radius_m || v_sep >= cfg.vertical_half_height_m
                }
                None => true,
            };
            if over {
                closed_losses.push(rec.key.clone());
            } else {
                still_active.insert(rec.key.first.clone());
                still_active.insert(rec.key.second.clone());
            }
        }
        for key in &closed_losses {
            if let Some(rec) = self.losses.remove(key) {
                tracing::info!(
                    pair = %key,
                    max_severity = rec.max_severity,
                    max_h_severity = rec.max_h_severity,
                    max_v_severity = rec.max_v_severity,
                    duration = simt - rec.t_start,
                    "loss of separation ended"
                );
                // Severity rose until the very end: the peak was never
                // logged, so log it now.
                if !rec.logged {
                    self.los_logged_events += 1;
                }
            }
        }

        // Aircraft that just lost authority go back to their own navigation.
        let released: Vec<String> = self
            .active
            .iter()
            .filter(|id| !still_active.contains(*id))
            .cloned()
            .collect();
        for id in released {
            self.active.remove(&id);
            if let Some(slot) = traf.slot_of(&id) {
                tracing::debug!(aircraft = %id, "resolution finished, resuming navigation");
                traf.resume_navigation(slot);
            }
        }
    }

    pub fn reset(&mut self) {
        self.conflicts.clear();
        self.losses.clear();
        self.active.clear();
        self.recently_created.clear();
        self.total_conflicts = 0;
        self.total_losses = 0;
        self.los_logged_events = 0;
    }
}

fn pair_states<'a>(
    traf: &'a dyn Traffic,
    key: &PairKey,
) -> Option<(&'a crate::traffic::AircraftState, &'a crate::traffic::AircraftState)> {
    let a = traf.slot_of(&key.first).and_then(|slot| traf.state(slot))?;
    let b = traf.slot_of(&key.second).and_then(|slot| traf.state(slot))?;
    Some((a, b))
}
