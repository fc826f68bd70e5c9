//! Error types for Deadair.

use thiserror::Error;

/// Deadair error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Persona lookup failure.
    #[error("unknown persona: {id}")]
    UnknownPersona { id: String },

    /// A breakdown was requested while one is already on air.
    #[error("a breakdown is already in progress")]
    BreakdownInProgress,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Two schedule windows overlap.
    #[error("schedule windows overlap: {first} and {second}")]
    ScheduleOverlap { first: String, second: String },

    /// Dialogue collaborator failed or timed out.
    #[error("dialogue generation failed: {0}")]
    Generation(String),

    /// The control room task is gone.
    #[error("control room is not running")]
    ControlRoomClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Daemon error
    #[error("daemon error: {0}")]
    Daemon(String),
}

/// Result type alias for Deadair.
pub type Result<T> = std::result::Result<T, Error>;
