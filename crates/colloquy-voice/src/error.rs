//! Error types for the voice adapter

use std::time::Duration;
use thiserror::Error;

use colloquy_core::EngineError;

/// Result type alias for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced on a turn stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Dialogue engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Opening the turn timed out after {0:?}")]
    OpenTimeout(Duration),
}

impl AdapterError {
    /// Worth another open attempt. A timed-out open may still have started a run, so it
    /// is never reissued.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Engine(e) => e.is_retryable(),
            AdapterError::OpenTimeout(_) => false,
        }
    }
}
