//! **In-process engine**: runs a [`TurnHandler`] per turn over an injected [`SessionStore`].
//!
//! Handlers talk through a [`NodeContext`] the same way remote graph nodes do: model
//! tokens on the `messages` channel, `say`/`flush` and other named signals on `custom`.
//! Every emission passes through [`EngineEvent::decode`], so both engines feed the turn
//! loop identical events.
//!
//! Runs on one session are serialised: each holds the session's lock from checkpoint load
//! to save. Dropping the returned stream aborts the run, and an aborted run saves nothing.

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use colloquy_core::{
    fragment_id, EngineEvent, EngineInput, EngineMessage, EngineResult, Interrupt, PendingTask,
    RunConfig, SessionKey, SessionState, StreamMode, StreamRead,
};

use crate::store::{Checkpoint, SessionStore};
use crate::traits::{DialogueEngine, EngineStream};

const DEFAULT_NODE: &str = "agent";

/// What a handler sees for one turn.
#[derive(Debug, Clone)]
pub struct NodeInput {
    pub session: SessionKey,
    /// Session history, including this turn's fresh user message.
    pub messages: Vec<EngineMessage>,
    /// Answer to the interrupt this run resumes from.
    pub resume: Option<Value>,
}

impl NodeInput {
    /// Text of the latest human message.
    pub fn last_human_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_human())
            .map(|m| m.content().as_text())
    }
}

/// How a handler ended the turn.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Finished; `reply` is recorded as the assistant message.
    Complete { reply: Option<String> },
    /// Pause for human input; the value is what the user is asked.
    Interrupt(Value),
}

/// Emitter handed to a running handler.
#[derive(Debug, Clone)]
pub struct NodeContext {
    tx: mpsc::UnboundedSender<EngineResult<StreamRead>>,
    modes: Arc<[StreamMode]>,
    run_id: String,
    node: String,
}

impl NodeContext {
    /// Model token delta.
    pub fn token(&self, text: &str) {
        let payload = json!([
            {"type": "AIMessageChunk", "content": text, "id": self.run_id},
            {"langgraph_node": self.node}
        ]);
        self.emit(StreamMode::Messages, payload);
    }

    /// Literal utterance, flushed right after.
    pub fn say(&self, text: &str) {
        self.emit(
            StreamMode::Custom,
            json!({"type": "say", "data": {"content": text}}),
        );
    }

    pub fn flush(&self) {
        self.emit(StreamMode::Custom, json!({"type": "flush"}));
    }

    /// Arbitrary named signal.
    pub fn custom(&self, name: &str, data: Value) {
        self.emit(StreamMode::Custom, json!({"type": name, "data": data}));
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&self, mode: StreamMode, payload: Value) {
        if !self.modes.contains(&mode) {
            return;
        }
        let Some(event) = EngineEvent::decode(mode, payload) else {
            return;
        };
        if self.tx.send(Ok(StreamRead::Event(event))).is_err() {
            debug!(run_id = %self.run_id, "reader gone, dropping event");
        }
    }
}

/// Body of the in-process graph: one call per turn.
#[async_trait::async_trait]
pub trait TurnHandler: Send + Sync {
    async fn run(&self, input: NodeInput, ctx: NodeContext) -> EngineResult<NodeOutcome>;
}

/// Dialogue engine running entirely inside this process.
#[derive(Clone)]
pub struct LocalGraph {
    handler: Arc<dyn TurnHandler>,
    store: Arc<dyn SessionStore>,
    node: String,
    locks: Arc<DashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl LocalGraph {
    pub fn new(handler: Arc<dyn TurnHandler>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            handler,
            store,
            node: DEFAULT_NODE.to_string(),
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Node name reported in stream metadata and pending tasks.
    pub fn with_node_name(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn session_lock(&self, session: &SessionKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(session.clone()).or_default().value())
    }
}

/// Reads of one local run. Dropping it aborts the run.
struct LocalRun {
    rx: mpsc::UnboundedReceiver<EngineResult<StreamRead>>,
    task: JoinHandle<()>,
}

impl Stream for LocalRun {
    type Item = EngineResult<StreamRead>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for LocalRun {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Load, run, persist. Returns the terminal read, if any.
async fn run_node(
    handler: &dyn TurnHandler,
    store: &dyn SessionStore,
    session: &SessionKey,
    input: EngineInput,
    ctx: NodeContext,
) -> Option<EngineResult<StreamRead>> {
    let mut checkpoint: Checkpoint = match store.load(session).await {
        Ok(checkpoint) => checkpoint.unwrap_or_default(),
        Err(e) => return Some(Err(e)),
    };

    let resume = match input {
        EngineInput::Fresh { messages } => {
            if checkpoint.is_interrupted() {
                warn!(
                    session = %session,
                    "fresh input while an interrupt is pending, discarding it"
                );
                checkpoint.interrupts.clear();
            }
            checkpoint.messages.extend(messages);
            None
        }
        EngineInput::Resume(cmd) => {
            if !checkpoint.is_interrupted() {
                debug!(session = %session, "resume without a pending interrupt");
            }
            checkpoint.interrupts.clear();
            Some(cmd.resume_value())
        }
    };

    let node_input = NodeInput {
        session: session.clone(),
        messages: checkpoint.messages.clone(),
        resume,
    };
    match handler.run(node_input, ctx).await {
        Ok(NodeOutcome::Complete { reply }) => {
            if let Some(reply) = reply {
                checkpoint.messages.push(EngineMessage::ai(reply));
            }
            store.save(session, checkpoint).await.err().map(Err)
        }
        Ok(NodeOutcome::Interrupt(value)) => {
            info!(session = %session, "⏸️ Run interrupted");
            checkpoint.interrupts.push(Interrupt::new(value));
            // Persist first so a state read after `Interrupted` sees the interrupt.
            match store.save(session, checkpoint).await {
                Ok(()) => Some(Ok(StreamRead::Interrupted)),
                Err(e) => Some(Err(e)),
            }
        }
        Err(e) => {
            warn!(session = %session, error = %e, "local run failed");
            Some(Err(e))
        }
    }
}

#[async_trait::async_trait]
impl DialogueEngine for LocalGraph {
    async fn stream(
        &self,
        input: EngineInput,
        config: &RunConfig,
        modes: &[StreamMode],
    ) -> EngineResult<EngineStream> {
        let session = config.thread_id().clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = NodeContext {
            tx: tx.clone(),
            modes: modes.into(),
            run_id: format!("run-{}", fragment_id()),
            node: self.node.clone(),
        };
        info!(session = %session, run_id = %ctx.run_id, "🚀 Starting local run");

        let handler = Arc::clone(&self.handler);
        let store = Arc::clone(&self.store);
        let lock = self.session_lock(&session);
        let task = tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            let terminal = run_node(handler.as_ref(), store.as_ref(), &session, input, ctx).await;
            if let Some(item) = terminal {
                let _ = tx.send(item);
            }
        });

        Ok(LocalRun { rx, task }.boxed())
    }

    async fn state(&self, config: &RunConfig) -> EngineResult<SessionState> {
        let checkpoint = self
            .store
            .load(config.thread_id())
            .await?
            .unwrap_or_default();
        if !checkpoint.is_interrupted() {
            return Ok(SessionState::default());
        }
        Ok(SessionState {
            tasks: vec![PendingTask {
                id: Some(format!("task-{}", config.thread_id())),
                name: Some(self.node.clone()),
                interrupts: checkpoint.interrupts,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use colloquy_core::{EngineFragment, MessageContent, ResumeCommand, ResumeFormat};
    use std::time::Duration;

    /// Says a filler line, streams the reply word by word, asks for confirmation once.
    struct Checkout;

    #[async_trait::async_trait]
    impl TurnHandler for Checkout {
        async fn run(&self, input: NodeInput, ctx: NodeContext) -> EngineResult<NodeOutcome> {
            if let Some(answer) = input.resume {
                let reply = format!("Answer: {}", answer);
                ctx.token(&reply);
                return Ok(NodeOutcome::Complete { reply: Some(reply) });
            }
            ctx.say("One moment.");
            ctx.custom("progress", json!(0.5));
            Ok(NodeOutcome::Interrupt(json!("Confirm purchase?")))
        }
    }

    fn human(text: &str) -> EngineMessage {
        EngineMessage::human(MessageContent::Text(text.into()), None)
    }

    async fn collect(stream: EngineStream) -> Vec<EngineResult<StreamRead>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn interrupt_then_resume() {
        let store = Arc::new(MemorySessionStore::new());
        let graph = LocalGraph::new(Arc::new(Checkout), store.clone());
        let config = RunConfig::for_session(SessionKey::new("s1"));
        let modes = [StreamMode::Messages, StreamMode::Custom];

        let reads = collect(
            graph
                .stream(EngineInput::fresh(Some(human("buy it"))), &config, &modes)
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(
            reads,
            vec![
                Ok(StreamRead::Event(EngineEvent::Say {
                    content: Some(EngineFragment::Text("One moment.".into()))
                })),
                Ok(StreamRead::Event(EngineEvent::Custom {
                    name: "progress".into()
                })),
                Ok(StreamRead::Interrupted),
            ]
        );
        let state = graph.state(&config).await.unwrap();
        assert_eq!(state.latest_text_interrupt(), Some("Confirm purchase?"));

        let resume = EngineInput::Resume(ResumeCommand {
            trigger: MessageContent::Text("yes".into()),
            messages: vec![EngineMessage::ai("Confirm purchase?"), human("yes")],
            format: ResumeFormat::Text,
        });
        let reads = collect(graph.stream(resume, &config, &modes).await.unwrap()).await;
        assert_eq!(reads.len(), 1);
        let Ok(StreamRead::Event(EngineEvent::ModelFragment(EngineFragment::Chunk {
            content, ..
        }))) = &reads[0]
        else {
            panic!("expected model fragment, got {:?}", reads);
        };
        assert_eq!(content, &json!("Answer: \"yes\""));

        assert_eq!(graph.state(&config).await.unwrap(), SessionState::default());
        let checkpoint = store.load(&SessionKey::new("s1")).await.unwrap().unwrap();
        assert_eq!(checkpoint.messages.len(), 2);
        assert_eq!(checkpoint.messages[1].content().as_text(), "Answer: \"yes\"");
    }

    #[tokio::test]
    async fn unrequested_modes_are_filtered() {
        let graph = LocalGraph::new(Arc::new(Checkout), Arc::new(MemorySessionStore::new()));
        let config = RunConfig::for_session(SessionKey::new("s2"));

        let reads = collect(
            graph
                .stream(EngineInput::fresh(None), &config, &[StreamMode::Messages])
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(reads, vec![Ok(StreamRead::Interrupted)]);
    }

    struct Failing;

    #[async_trait::async_trait]
    impl TurnHandler for Failing {
        async fn run(&self, _input: NodeInput, ctx: NodeContext) -> EngineResult<NodeOutcome> {
            ctx.token("partial");
            Err(colloquy_core::EngineError::Engine("tool crashed".into()))
        }
    }

    #[tokio::test]
    async fn handler_error_ends_stream_with_err() {
        let graph = LocalGraph::new(Arc::new(Failing), Arc::new(MemorySessionStore::new()))
            .with_node_name("planner");
        let config = RunConfig::for_session(SessionKey::new("s3"));
        let reads = collect(
            graph
                .stream(EngineInput::fresh(None), &config, &[StreamMode::Messages])
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(reads.len(), 2);
        assert!(reads[0].is_ok());
        assert_eq!(
            reads[1],
            Err(colloquy_core::EngineError::Engine("tool crashed".into()))
        );
    }

    /// Streams a token, then takes its time before echoing the user.
    struct SlowEcho {
        delay: Duration,
        interrupt: bool,
    }

    #[async_trait::async_trait]
    impl TurnHandler for SlowEcho {
        async fn run(&self, input: NodeInput, ctx: NodeContext) -> EngineResult<NodeOutcome> {
            ctx.token("thinking");
            tokio::time::sleep(self.delay).await;
            if self.interrupt {
                return Ok(NodeOutcome::Interrupt(json!("Still there?")));
            }
            Ok(NodeOutcome::Complete {
                reply: input.last_human_text(),
            })
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_the_run() {
        let store = Arc::new(MemorySessionStore::new());
        let handler = SlowEcho {
            delay: Duration::from_millis(100),
            interrupt: true,
        };
        let graph = LocalGraph::new(Arc::new(handler), store.clone());
        let config = RunConfig::for_session(SessionKey::new("s4"));

        let mut stream = graph
            .stream(
                EngineInput::fresh(Some(human("hello"))),
                &config,
                &[StreamMode::Messages],
            )
            .await
            .unwrap();
        tokio_test::assert_ok!(stream.next().await.unwrap());
        drop(stream);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.load(&SessionKey::new("s4")).await.unwrap().is_none());
        assert_eq!(graph.state(&config).await.unwrap(), SessionState::default());
    }

    #[tokio::test]
    async fn runs_on_one_session_do_not_interleave() {
        let store = Arc::new(MemorySessionStore::new());
        let handler = SlowEcho {
            delay: Duration::from_millis(50),
            interrupt: false,
        };
        let graph = LocalGraph::new(Arc::new(handler), store.clone());
        let config = RunConfig::for_session(SessionKey::new("s5"));
        let modes = [StreamMode::Messages];

        let first = graph
            .stream(EngineInput::fresh(Some(human("one"))), &config, &modes)
            .await
            .unwrap();
        let second = graph
            .stream(EngineInput::fresh(Some(human("two"))), &config, &modes)
            .await
            .unwrap();
        let (a, b) = tokio::join!(collect(first), collect(second));
        assert!(a.iter().chain(b.iter()).all(Result::is_ok));

        let checkpoint = store.load(&SessionKey::new("s5")).await.unwrap().unwrap();
        let texts: Vec<String> = checkpoint
            .messages
            .iter()
            .map(|m| m.content().as_text())
            .collect();
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[0], texts[1]);
        assert_eq!(texts[2], texts[3]);
        assert_ne!(texts[0], texts[2]);
    }

    #[test]
    fn last_human_text() {
        let input = NodeInput {
            session: SessionKey::new("s"),
            messages: vec![human("first"), EngineMessage::ai("ok"), human("second")],
            resume: None,
        };
        assert_eq!(input.last_human_text().as_deref(), Some("second"));
    }
}
