//! Simulator errors

use thiserror::Error;

use crate::support::ocpp_frame::FrameError;

/// Errors surfaced by charger sessions and the registry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulatorError {
    #[error("Charger {0} already exists")]
    AlreadyExists(String),

    #[error("Charger {0} not found")]
    NotFound(String),

    #[error("Charger {0} has no operational connection")]
    NoActiveConnection(String),

    #[error("Charger {0} already has a transaction in progress")]
    TransactionAlreadyActive(String),

    #[error("Charger {0} has no transaction in progress")]
    NoActiveTransaction(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Boot rejected with status {0}")]
    BootRejected(String),

    #[error("{action} call {unique_id} timed out")]
    CallTimedOut { action: String, unique_id: String },

    #[error("Session for charger {0} is no longer running")]
    SessionUnavailable(String),
}

impl From<FrameError> for SimulatorError {
    fn from(e: FrameError) -> Self {
        Self::MalformedMessage(e.to_string())
    }
}

/// Result type for simulator operations
pub type SimResult<T> = Result<T, SimulatorError>;
