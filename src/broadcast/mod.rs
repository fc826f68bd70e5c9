//! The broadcast engine: triggers, the breakdown sequence, rotation,
//! the program schedule, the event bus, and the control room that ties
//! them together.

pub mod control;
pub mod events;
pub mod rotation;
pub mod schedule;
pub mod sequencer;
pub mod trigger;

pub use control::{BreakdownPrediction, ControlRoom, ControlRoomConfig, ControlRoomHandle, StatusReport, metrics_loop, spawn};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use rotation::RotationTimer;
pub use schedule::{ProgramSchedule, ScheduleWindow};
pub use sequencer::{BreakdownHistory, BreakdownRecord, BreakdownStage};
pub use trigger::{TriggerEvaluator, TriggerReason};
