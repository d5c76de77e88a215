//! Session persistence for the in-process engine.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use colloquy_core::{EngineMessage, EngineResult, Interrupt, SessionKey};

/// What the in-process engine remembers about one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub messages: Vec<EngineMessage>,
    /// Unanswered interrupts, oldest first.
    pub interrupts: Vec<Interrupt>,
}

impl Checkpoint {
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }
}

/// Backing store for checkpoints, keyed by session. Injected into the engine so several
/// engines (or tests) never share state implicitly.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &SessionKey) -> EngineResult<Option<Checkpoint>>;

    async fn save(&self, key: &SessionKey, checkpoint: Checkpoint) -> EngineResult<()>;

    async fn clear(&self, key: &SessionKey) -> EngineResult<()>;
}

/// Process-local store. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<SessionKey, Checkpoint>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with a checkpoint.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &SessionKey) -> EngineResult<Option<Checkpoint>> {
        Ok(self.sessions.get(key).map(|c| c.clone()))
    }

    async fn save(&self, key: &SessionKey, checkpoint: Checkpoint) -> EngineResult<()> {
        self.sessions.insert(key.clone(), checkpoint);
        Ok(())
    }

    async fn clear(&self, key: &SessionKey) -> EngineResult<()> {
        self.sessions.remove(key);
        Ok(())
    }
}
