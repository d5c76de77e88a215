//! The engine-facing seam. Implement [`DialogueEngine`] for any runtime that can run a
//! graph turn as an event stream and report pending interrupts.

use futures::stream::BoxStream;

use colloquy_core::{EngineInput, EngineResult, RunConfig, SessionState, StreamMode, StreamRead};

/// Events of one engine run, in arrival order. Ends after `StreamRead::Interrupted`, an
/// error, or normal completion.
pub type EngineStream = BoxStream<'static, EngineResult<StreamRead>>;

#[async_trait::async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Start a run for the session in `config` and stream the requested modes.
    async fn stream(
        &self,
        input: EngineInput,
        config: &RunConfig,
        modes: &[StreamMode],
    ) -> EngineResult<EngineStream>;

    /// Current session snapshot, including interrupts raised by paused tasks.
    async fn state(&self, config: &RunConfig) -> EngineResult<SessionState>;
}
