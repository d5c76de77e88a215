//! Scripted dialogue engine for turn tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use colloquy_core::{
    EngineError, EngineEvent, EngineFragment, EngineInput, EngineResult, Interrupt, PendingTask,
    RunConfig, SessionKey, SessionState, StreamMode, StreamRead,
};
use colloquy_engine::{DialogueEngine, EngineStream};
use futures::StreamExt;
use serde_json::{json, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn config() -> RunConfig {
    RunConfig::for_session(SessionKey::new("thread-test"))
}

pub fn text(s: &str) -> EngineResult<StreamRead> {
    Ok(StreamRead::Event(EngineEvent::ModelFragment(EngineFragment::Text(s.into()))))
}

pub fn chunk(id: &str, content: Value) -> EngineResult<StreamRead> {
    Ok(StreamRead::Event(EngineEvent::ModelFragment(EngineFragment::Chunk {
        id: Some(id.into()),
        content,
    })))
}

pub fn say(s: Option<&str>) -> EngineResult<StreamRead> {
    Ok(StreamRead::Event(EngineEvent::Say {
        content: s.map(|s| EngineFragment::Text(s.into())),
    }))
}

pub fn flush() -> EngineResult<StreamRead> {
    Ok(StreamRead::Event(EngineEvent::Flush))
}

pub fn interrupted_state(value: Value) -> SessionState {
    SessionState {
        tasks: vec![PendingTask {
            id: Some("t1".into()),
            name: Some("agent".into()),
            interrupts: vec![Interrupt::new(value)],
        }],
    }
}

pub fn pending(question: &str) -> EngineResult<SessionState> {
    Ok(interrupted_state(json!(question)))
}

/// How one `stream` call behaves.
pub enum Open {
    Reads(Vec<EngineResult<StreamRead>>),
    /// Emit these, then never finish. The flag flips when the stream is dropped.
    ReadsThenHang(Vec<EngineResult<StreamRead>>, Arc<AtomicBool>),
    Fail(EngineError),
    /// Never answer the open.
    Stall,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Engine answering from queues; empty queues mean "empty run" and "no interrupts".
#[derive(Default)]
pub struct ScriptedEngine {
    opens: Mutex<VecDeque<Open>>,
    states: Mutex<VecDeque<EngineResult<SessionState>>>,
    pub inputs: Mutex<Vec<EngineInput>>,
    pub modes: Mutex<Vec<Vec<StreamMode>>>,
    pub open_calls: AtomicUsize,
    pub state_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(self, open: Open) -> Self {
        self.opens.lock().unwrap().push_back(open);
        self
    }

    pub fn reads(self, reads: Vec<EngineResult<StreamRead>>) -> Self {
        self.open(Open::Reads(reads))
    }

    pub fn state(self, state: EngineResult<SessionState>) -> Self {
        self.states.lock().unwrap().push_back(state);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn recorded_inputs(&self) -> Vec<EngineInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DialogueEngine for ScriptedEngine {
    async fn stream(
        &self,
        input: EngineInput,
        _config: &RunConfig,
        modes: &[StreamMode],
    ) -> EngineResult<EngineStream> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input);
        self.modes.lock().unwrap().push(modes.to_vec());

        let next = self.opens.lock().unwrap().pop_front();
        match next.unwrap_or(Open::Reads(vec![])) {
            Open::Reads(reads) => Ok(futures::stream::iter(reads).boxed()),
            Open::ReadsThenHang(reads, dropped) => {
                let guard = DropFlag(dropped);
                Ok(futures::stream::iter(reads)
                    .chain(futures::stream::pending())
                    .map(move |read| {
                        let _keep = &guard;
                        read
                    })
                    .boxed())
            }
            Open::Fail(e) => Err(e),
            Open::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(EngineError::Transport("stalled".into()))
            }
        }
    }

    async fn state(&self, _config: &RunConfig) -> EngineResult<SessionState> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.states.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(SessionState::default()))
    }
}
