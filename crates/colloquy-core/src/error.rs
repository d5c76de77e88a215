//! Error types for talking to a dialogue engine.

use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by a dialogue engine or the transport in front of it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine was never reached; no request was submitted.
    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Engine run failed: {0}")]
    Engine(String),

    #[error("Session store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Connectivity-level failure (unreachable endpoint or error status).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::Unreachable(_) | EngineError::Transport(_) | EngineError::Status { .. }
        )
    }

    /// Safe to reopen a stream after this: only when the request provably never reached
    /// the engine. Anything else may already have started a run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Unreachable(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
