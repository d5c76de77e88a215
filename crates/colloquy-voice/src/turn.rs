//! Turn streaming: one engine run per user turn, converted to pipeline fragments.
//!
//! A turn moves through `BuildingInput → Streaming → DrainingInterrupt → Done` on a single
//! spawned task. Fragments are sent in arrival order over an unbounded channel; the
//! [`TurnStream`] handle is the receiving end. Dropping it aborts the task.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use colloquy_core::{
    flush_fragment, to_outbound_fragment, ChatChunk, ConnectOptions, EngineEvent, EngineFragment,
    EngineInput, EngineMessage, MessageContent, ResumeCommand, ResumeFormat, RunConfig, StreamMode,
    StreamRead,
};
use colloquy_engine::{DialogueEngine, EngineStream};

use crate::error::{AdapterError, AdapterResult};
use crate::inspector::InterruptInspector;

/// Modes every turn subscribes to.
pub const TURN_MODES: [StreamMode; 2] = [StreamMode::Messages, StreamMode::Custom];

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    BuildingInput,
    Streaming,
    DrainingInterrupt,
    Done,
}

/// Per-turn behaviour knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    pub resume_format: ResumeFormat,
    pub connect: ConnectOptions,
}

/// Build the engine input for a turn.
///
/// A pending interrupt turns the user message into the answer to it; with no user
/// message the answer is empty and only the interrupt is reconstructed.
pub fn build_input(
    user: Option<EngineMessage>,
    pending: Option<String>,
    format: ResumeFormat,
) -> EngineInput {
    let Some(question) = pending else {
        return EngineInput::fresh(user);
    };

    let trigger = user
        .as_ref()
        .map(|m| m.content().clone())
        .unwrap_or_else(MessageContent::default);
    let mut messages = vec![EngineMessage::ai(question)];
    messages.extend(user);
    EngineInput::Resume(ResumeCommand {
        trigger,
        messages,
        format,
    })
}

/// Receiving end of a running turn. Yields fragments, then closes.
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<AdapterResult<ChatChunk>>,
    phase: watch::Receiver<TurnPhase>,
    task: JoinHandle<()>,
    cancelled: bool,
}

impl TurnStream {
    /// Spawn the turn task. Must be called inside a tokio runtime.
    pub fn spawn(
        engine: Arc<dyn DialogueEngine>,
        user: Option<EngineMessage>,
        config: RunConfig,
        options: TurnOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(TurnPhase::BuildingInput);
        let task = tokio::spawn(run_turn(engine, user, config, options, tx, phase_tx));
        Self {
            rx,
            phase,
            task,
            cancelled: false,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        if self.cancelled {
            return TurnPhase::Done;
        }
        *self.phase.borrow()
    }

    /// Next fragment, `None` once the turn is over.
    pub async fn recv(&mut self) -> Option<AdapterResult<ChatChunk>> {
        self.rx.recv().await
    }

    /// Stop consuming engine events. Nothing further is emitted.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            debug!("turn cancelled");
            self.cancelled = true;
            self.task.abort();
            self.rx.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Stream for TurnStream {
    type Item = AdapterResult<ChatChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outbound side held by the turn task.
struct Outbound {
    tx: mpsc::UnboundedSender<AdapterResult<ChatChunk>>,
}

impl Outbound {
    /// `false` once the receiver is gone.
    fn send(&self, item: AdapterResult<ChatChunk>) -> bool {
        self.tx.send(item).is_ok()
    }

    fn fragment(&self, fragment: Option<&EngineFragment>) -> bool {
        match to_outbound_fragment(fragment) {
            Some(chunk) => self.send(Ok(chunk)),
            None => true,
        }
    }

    fn flush(&self) -> bool {
        self.send(Ok(flush_fragment()))
    }

    fn event(&self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::ModelFragment(fragment) => self.fragment(Some(&fragment)),
            EngineEvent::Say { content } => self.fragment(content.as_ref()) && self.flush(),
            EngineEvent::Flush => self.flush(),
            EngineEvent::Custom { name } => {
                debug!(signal = %name, "ignoring custom signal");
                true
            }
        }
    }
}

async fn run_turn(
    engine: Arc<dyn DialogueEngine>,
    user: Option<EngineMessage>,
    config: RunConfig,
    options: TurnOptions,
    tx: mpsc::UnboundedSender<AdapterResult<ChatChunk>>,
    phase: watch::Sender<TurnPhase>,
) {
    let out = Outbound { tx };
    let session = config.thread_id().clone();
    let inspector = InterruptInspector::new(Arc::clone(&engine));

    let pending = inspector.pending(&config).await;
    let input = build_input(user, pending, options.resume_format);
    info!(session = %session, resume = input.is_resume(), "🎙️ Turn started");

    let _ = phase.send(TurnPhase::Streaming);
    let mut stream = match open(engine.as_ref(), &input, &config, &options.connect).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(session = %session, error = %e, "❌ Could not open turn");
            out.send(Err(e));
            let _ = phase.send(TurnPhase::Done);
            return;
        }
    };

    while let Some(read) = stream.next().await {
        match read {
            Ok(StreamRead::Event(event)) => {
                if !out.event(event) {
                    debug!(session = %session, "receiver gone, ending turn");
                    let _ = phase.send(TurnPhase::Done);
                    return;
                }
            }
            Ok(StreamRead::Interrupted) => {
                info!(session = %session, "⏸️ Engine paused for input");
                break;
            }
            Err(e) => {
                warn!(session = %session, error = %e, "❌ Engine stream failed");
                out.send(Err(AdapterError::Engine(e)));
                let _ = phase.send(TurnPhase::Done);
                return;
            }
        }
    }
    drop(stream);

    let _ = phase.send(TurnPhase::DrainingInterrupt);
    if let Some(question) = inspector.pending(&config).await {
        out.fragment(Some(&EngineFragment::Text(question)));
    }

    let _ = phase.send(TurnPhase::Done);
    info!(session = %session, "✅ Turn complete");
}

/// Open the engine stream. Only opens that never reached the engine are reissued, so a
/// turn submits at most one run.
async fn open(
    engine: &dyn DialogueEngine,
    input: &EngineInput,
    config: &RunConfig,
    connect: &ConnectOptions,
) -> AdapterResult<EngineStream> {
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(
            connect.timeout(),
            engine.stream(input.clone(), config, &TURN_MODES),
        )
        .await
        {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => AdapterError::Engine(e),
            Err(_) => AdapterError::OpenTimeout(connect.timeout()),
        };

        if !err.is_retryable() || attempt >= connect.max_retry {
            return Err(err);
        }
        attempt += 1;
        warn!(
            attempt,
            max_retry = connect.max_retry,
            error = %err,
            "🔁 Retrying turn open"
        );
        tokio::time::sleep(connect.retry_interval()).await;
    }
}
