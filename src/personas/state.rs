//! Mental-state tracking for anchors.
//!
//! Every anchor carries two bounded scalars (sanity, confusion) and an
//! hours-awake counter. Sanity drains slowly while on air, confusion
//! accumulates stochastically, and breakdowns move both by fixed steps.
//! All arithmetic saturates; no operation here can fail.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TriggerSettings;

/// Sanity lost when a breakdown starts.
pub const BREAKDOWN_SANITY_COST: u8 = 20;
/// Confusion gained when a breakdown starts.
pub const BREAKDOWN_CONFUSION_SPIKE: u8 = 30;
/// Confusion shed when a breakdown completes.
pub const RECOVERY_CONFUSION_DROP: u8 = 50;

/// Mutable mental state for one anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaState {
    /// Persona this state belongs to.
    pub persona_id: String,
    /// Continuous hours on air since process start.
    pub hours_awake: f64,
    /// Sanity, 0..=100. Decays monotonically between breakdowns.
    pub sanity_level: u8,
    /// Confusion, 0..=100. Rises stochastically, drops on recovery.
    pub confusion_level: u8,
    /// Set when the scheduler judges a breakdown close.
    pub breakdown_imminent: bool,
    /// Fractional sanity decay not yet applied (sub-point remainder).
    #[serde(skip)]
    decay_carry: f64,
}

impl PersonaState {
    /// Fresh state: fully sane, fully lucid, zero hours awake.
    pub fn new(persona_id: impl Into<String>) -> Self {
        Self {
            persona_id: persona_id.into(),
            hours_awake: 0.0,
            sanity_level: 100,
            confusion_level: 0,
            breakdown_imminent: false,
            decay_carry: 0.0,
        }
    }

    /// Advance this anchor's state by `delta` of on-air time.
    pub fn tick(&mut self, delta: Duration, settings: &TriggerSettings, rng: &mut impl Rng) {
        let hours = delta.as_secs_f64() / 3600.0;
        self.hours_awake += hours;

        // Fractional decay accumulates so short ticks still drain sanity.
        self.decay_carry += settings.sanity_decay_per_hour * hours;
        let whole = self.decay_carry.floor();
        if whole >= 1.0 {
            self.decay_carry -= whole;
            self.sanity_level = self.sanity_level.saturating_sub(whole.min(100.0) as u8);
        }

        if rng.random::<f64>() < settings.confusion_chance {
            self.confusion_level = self
                .confusion_level
                .saturating_add(settings.confusion_increment)
                .min(100);
        }
    }

    /// Apply the cost of a breakdown starting.
    pub fn apply_breakdown_effects(&mut self) {
        self.sanity_level = self.sanity_level.saturating_sub(BREAKDOWN_SANITY_COST);
        self.confusion_level = self.confusion_level.saturating_add(BREAKDOWN_CONFUSION_SPIKE).min(100);
    }

    /// Apply post-breakdown recovery. Safe to call repeatedly.
    pub fn apply_recovery(&mut self) {
        self.confusion_level = self.confusion_level.saturating_sub(RECOVERY_CONFUSION_DROP);
        self.breakdown_imminent = false;
    }
}

/// Owns the mental state of every anchor on the desk.
#[derive(Debug, Clone, Default)]
pub struct MentalStateTracker {
    states: HashMap<String, PersonaState>,
}

impl MentalStateTracker {
    /// Create a tracker for the given persona IDs.
    pub fn new(persona_ids: &[String]) -> Self {
        let states = persona_ids
            .iter()
            .map(|id| (id.clone(), PersonaState::new(id.clone())))
            .collect();
        Self { states }
    }

    /// Advance every anchor by `delta`.
    pub fn tick(&mut self, delta: Duration, settings: &TriggerSettings, rng: &mut impl Rng) {
        for state in self.states.values_mut() {
            state.tick(delta, settings, rng);
        }
    }

    /// Apply breakdown-start effects to every anchor.
    pub fn apply_breakdown_effects(&mut self) {
        for state in self.states.values_mut() {
            state.apply_breakdown_effects();
        }
    }

    /// Apply post-breakdown recovery to every anchor.
    pub fn apply_recovery(&mut self) {
        for state in self.states.values_mut() {
            state.apply_recovery();
        }
    }

    /// Mark or clear breakdown-imminent on every anchor.
    pub fn set_breakdown_imminent(&mut self, imminent: bool) {
        for state in self.states.values_mut() {
            state.breakdown_imminent = imminent;
        }
    }

    /// Look up one anchor's state.
    pub fn get(&self, persona_id: &str) -> Option<&PersonaState> {
        self.states.get(persona_id)
    }

    /// Snapshot of every anchor's state, ordered by persona ID.
    pub fn snapshot(&self) -> Vec<PersonaState> {
        let mut states: Vec<_> = self.states.values().cloned().collect();
        states.sort_by(|a, b| a.persona_id.cmp(&b.persona_id));
        states
    }

    /// Highest confusion level across the desk.
    pub fn peak_confusion(&self) -> u8 {
        self.states.values().map(|s| s.confusion_level).max().unwrap_or(0)
    }

    /// Lowest sanity level across the desk.
    pub fn floor_sanity(&self) -> u8 {
        self.states.values().map(|s| s.sanity_level).min().unwrap_or(100)
    }
}
