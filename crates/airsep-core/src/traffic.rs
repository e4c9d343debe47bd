//! Interface to the traffic collaborator that owns aircraft kinematic state.

use serde::{Deserialize, Serialize};

/// Kinematic state of one aircraft, read-only to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AircraftState {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    /// Track angle in degrees, 0 = north, clockwise.
    pub track_deg: f64,
    /// Ground-speed east component [m/s].
    pub gs_east: f64,
    /// Ground-speed north component [m/s].
    pub gs_north: f64,
    /// Vertical speed [m/s], positive up.
    pub vs_mps: f64,
    /// True airspeed [m/s].
    pub tas_mps: f64,
}

impl AircraftState {
    /// Horizontal ground speed magnitude [m/s].
    pub fn ground_speed(&self) -> f64 {
        self.gs_east.hypot(self.gs_north)
    }
}

/// Read access to the simulation's traffic, plus the navigation-recovery
/// hook used when a conflict is over.
///
/// Slots are dense indices `0..count()`; they shift when aircraft are
/// deleted, which is why persistent records key on aircraft ids and resolve
/// them through [`Traffic::slot_of`] every cycle. A failed lookup returns
/// `None`, never panics.
pub trait Traffic {
    fn count(&self) -> usize;

    fn state(&self, slot: usize) -> Option<&AircraftState>;

    /// Slot of the aircraft with the given id, if it still exists.
    fn slot_of(&self, id: &str) -> Option<usize>;

    /// Altitude currently commanded by the autopilot/FMS [m].
    fn autopilot_altitude(&self, slot: usize) -> f64;

    /// Direct the aircraft back to its next active waypoint. Called when a
    /// conflict is resolved and guidance is handed back to the autopilot.
    fn resume_navigation(&mut self, slot: usize);
}
