//! Persona system for Deadair.
//!
//! Provides:
//! - Persona definitions with bias labels and verbal quirks
//! - PersonaRegistry for lookup and rotation order
//! - Mental-state tracking (sanity, confusion, hours awake)

pub mod persona;
pub mod state;

pub use persona::{Persona, PersonaRegistry};
pub use state::{MentalStateTracker, PersonaState};
