//! The ASAS controller: owns the configuration, the selected detection and
//! resolution algorithms, the lifecycle tracker and the exemption lists, and
//! runs the detect → track → resolve → retire cycle on its own schedule.

use std::collections::HashMap;

use crate::areas::AreaRegistry;
use crate::config::{AsasConfig, ConfigError};
use crate::detect::{ConflictDetector, Detection, StateBasedDetector};
use crate::lifecycle::LifecycleTracker;
use crate::resolve::{ConflictResolver, Exemptions, MvpResolver, NoResolver, ResolutionCommand};
use crate::traffic::Traffic;

fn make_statebased() -> Box<dyn ConflictDetector> {
    Box::new(StateBasedDetector::new())
}

fn make_mvp() -> Box<dyn ConflictResolver> {
    Box::new(MvpResolver::new())
}

fn make_off() -> Box<dyn ConflictResolver> {
    Box::new(NoResolver)
}

/// Selectable detection algorithms.
const DETECTORS: &[(&str, fn() -> Box<dyn ConflictDetector>)] = &[("STATEBASED", make_statebased)];

/// Selectable resolution algorithms.
const RESOLVERS: &[(&str, fn() -> Box<dyn ConflictResolver>)] =
    &[("MVP", make_mvp), ("OFF", make_off)];

/// Airborne separation assurance controller.
pub struct Asas {
    config: AsasConfig,
    detector: Box<dyn ConflictDetector>,
    resolver: Box<dyn ConflictResolver>,
    tracker: LifecycleTracker,
    exemptions: Exemptions,
    /// Slot-indexed output of the last completed cycle.
    commands: Vec<ResolutionCommand>,
    active: Vec<bool>,
    /// Last non-empty command per aircraft, held while its conflict is
    /// still open even if no new pair was perceived this cycle.
    held_commands: HashMap<String, ResolutionCommand>,
    last_detection: Detection,
    t_next: f64,
}

impl Default for Asas {
    fn default() -> Self {
        Self::new(AsasConfig::default())
    }
}

impl Asas {
    pub fn new(config: AsasConfig) -> Self {
        Self {
            config,
            detector: make_statebased(),
            resolver: make_mvp(),
            tracker: LifecycleTracker::new(),
            exemptions: Exemptions::new(),
            commands: Vec::new(),
            active: Vec::new(),
            held_commands: HashMap::new(),
            last_detection: Detection::default(),
            t_next: 0.0,
        }
    }

    pub fn config(&self) -> &AsasConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AsasConfig {
        &mut self.config
    }

    pub fn tracker(&self) -> &LifecycleTracker {
        &self.tracker
    }

    pub fn exemptions_mut(&mut self) -> &mut Exemptions {
        &mut self.exemptions
    }

    /// Geometry of the last completed detection pass.
    pub fn last_detection(&self) -> &Detection {
        &self.last_detection
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    pub fn detector_names() -> impl Iterator<Item = &'static str> {
        DETECTORS.iter().map(|(name, _)| *name)
    }

    pub fn resolver_names() -> impl Iterator<Item = &'static str> {
        RESOLVERS.iter().map(|(name, _)| *name)
    }

    /// Select the detection algorithm by name (case-insensitive).
    pub fn set_detector(&mut self, name: &str) -> Result<(), ConfigError> {
        let wanted = name.to_ascii_uppercase();
        match DETECTORS.iter().find(|(n, _)| *n == wanted) {
            Some((_, factory)) => {
                self.detector = factory();
                Ok(())
            }
            None => Err(ConfigError::UnknownDetector(name.to_string())),
        }
    }

    /// Select the resolution algorithm by name (case-insensitive).
    pub fn set_resolver(&mut self, name: &str) -> Result<(), ConfigError> {
        let wanted = name.to_ascii_uppercase();
        match RESOLVERS.iter().find(|(n, _)| *n == wanted) {
            Some((_, factory)) => {
                self.resolver = factory();
                Ok(())
            }
            None => Err(ConfigError::UnknownResolver(name.to_string())),
        }
    }

    /// Register a freshly created aircraft (spawn-check window). A default
    /// slot is appended so the outputs stay aligned with the traffic.
    pub fn aircraft_created(&mut self, id: &str) {
        self.tracker.note_created(id);
        self.commands.push(ResolutionCommand::default());
        self.active.push(false);
    }

    /// Drop state tied to a deleted aircraft. Only the deleted slot is
    /// removed from the outputs, mirroring the shift in the traffic's
    /// slots, so other aircraft keep their guidance until the next cycle.
    pub fn aircraft_deleted(&mut self, id: &str, slot: usize) {
        self.tracker.note_deleted(id);
        self.exemptions.set_no_avoidance(id, false);
        self.exemptions.set_resolution_off(id, false);
        self.held_commands.remove(id);
        if slot < self.commands.len() {
            self.commands.remove(slot);
        }
        if slot < self.active.len() {
            self.active.remove(slot);
        }
    }

    /// Whether this aircraft currently follows ASAS guidance rather than
    /// its autopilot.
    pub fn is_active(&self, slot: usize) -> bool {
        self.active.get(slot).copied().unwrap_or(false)
    }

    /// Guidance for the given slot, when ASAS holds authority over it.
    pub fn command(&self, slot: usize) -> Option<&ResolutionCommand> {
        if !self.is_active(slot) {
            return None;
        }
        self.commands.get(slot).filter(|cmd| !cmd.is_empty())
    }

    /// Run one CD&R cycle if the schedule says so. Between scheduled runs
    /// this is a no-op and previous commands stay in force.
    pub fn update(&mut self, traf: &mut dyn Traffic, areas: &AreaRegistry, simt: f64) {
        if !self.config.enabled {
            self.commands.clear();
            self.active.clear();
            return;
        }
        if simt < self.t_next {
            return;
        }
        self.t_next = simt + self.config.interval_s;

        let detection = self.detector.detect(traf, &self.config, areas, simt);
        self.tracker.observe(&detection, &self.config, simt);

        self.commands = self.resolver.resolve(
            &detection,
            traf,
            &self.config,
            &self.tracker,
            &self.exemptions,
        );
        self.last_detection = detection;

        // Retire finished encounters before publishing authority, so an
        // aircraft never keeps following a resolution past its hand-back.
        self.tracker.sweep(traf, &self.config, simt);

        self.active = (0..traf.count())
            .map(|slot| {
                traf.state(slot)
                    .map(|state| self.tracker.is_active(&state.id))
                    .unwrap_or(false)
            })
            .collect();

        // An aircraft whose conflict is still open keeps flying its last
        // resolution even when this cycle perceived no pair for it.
        let mut held = HashMap::new();
        for slot in 0..traf.count() {
            let Some(state) = traf.state(slot) else { continue };
            if !self.active[slot] {
                continue;
            }
            if self.commands[slot].is_empty() {
                if let Some(prev) = self.held_commands.get(&state.id) {
                    self.commands[slot] = *prev;
                }
            }
            if !self.commands[slot].is_empty() {
                held.insert(state.id.clone(), self.commands[slot]);
            }
        }
        self.held_commands = held;

        tracing::debug!(
            simt,
            conflicts = self.tracker.conflict_count(),
            losses = self.tracker.los_count(),
            active = self.active.iter().filter(|a| **a).count(),
            "asas cycle complete"
        );
    }

    /// Back to a clean slate: default config, empty tracker and exemptions.
    pub fn reset(&mut self) {
        self.config = AsasConfig::default();
        self.tracker.reset();
        self.exemptions.clear();
        self.commands.clear();
        self.active.clear();
        self.held_commands.clear();
        self.last_detection = Detection::default();
        self.t_next = 0.0;
    }
}
