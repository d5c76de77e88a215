//! Interrupt inspection: is the session paused waiting for the user?

use std::sync::Arc;
use tracing::{debug, warn};

use colloquy_core::RunConfig;
use colloquy_engine::DialogueEngine;

/// Reads pending interrupts from the engine. Every call is a fresh read.
#[derive(Clone)]
pub struct InterruptInspector {
    engine: Arc<dyn DialogueEngine>,
}

impl InterruptInspector {
    pub fn new(engine: Arc<dyn DialogueEngine>) -> Self {
        Self { engine }
    }

    /// Latest string-valued interrupt of the session, if any.
    ///
    /// Engine failures are logged and reported as "no interrupt"; an unreachable state
    /// endpoint must not fail the turn.
    pub async fn pending(&self, config: &RunConfig) -> Option<String> {
        match self.engine.state(config).await {
            Ok(state) => {
                let pending = state.latest_text_interrupt().map(str::to_string);
                debug!(session = %config.thread_id(), pending = ?pending, "interrupt check");
                pending
            }
            Err(e) => {
                warn!(
                    session = %config.thread_id(),
                    error = %e,
                    "⚠️ Interrupt check failed, assuming none"
                );
                None
            }
        }
    }
}
