//! Deadair: an always-on satirical news studio daemon.
//!
//! Deadair keeps a desk of scripted AI news anchors on air around the
//! clock, schedules their periodic on-air existential breakdowns, and
//! serves clients over a Unix socket.

pub mod broadcast;
pub mod config;
pub mod daemon;
pub mod dialogue;
pub mod error;
pub mod personas;

pub use broadcast::{BreakdownRecord, BreakdownStage, ControlRoomHandle, EventBus, TriggerReason};
pub use config::Config;
pub use daemon::{Daemon, DaemonConfig};
pub use dialogue::{CannedDialogue, DialogueLine, DialogueSource};
pub use error::{Error, Result};
pub use personas::{Persona, PersonaRegistry};
