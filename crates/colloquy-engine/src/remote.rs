//! **Remote engine**: LangGraph-compatible server over HTTP, run events over SSE.
//!
//! `POST {url}/threads/{thread_id}/runs/stream` starts a run (creating the thread on first
//! use) and answers with an event stream; `GET {url}/threads/{thread_id}/state` reports
//! pending interrupts.

use eventsource_stream::Eventsource;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use colloquy_core::{
    carries_interrupt, EngineError, EngineEvent, EngineInput, EngineResult, EngineSettings,
    RunConfig, SessionState, StreamMode, StreamRead,
};

use crate::traits::{DialogueEngine, EngineStream};

const API_KEY_HEADER: &str = "x-api-key";
const GRAPH_INTERRUPT: &str = "GraphInterrupt";

type SseEvents = BoxStream<
    'static,
    Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>,
>;

/// A failed connect means the request never left; anything later may have reached the
/// server.
fn transport(err: reqwest::Error) -> EngineError {
    if err.is_connect() {
        EngineError::Unreachable(err.to_string())
    } else {
        EngineError::Transport(err.to_string())
    }
}

/// What one SSE event means for the run.
#[derive(Debug, PartialEq)]
pub(crate) enum SseOutcome {
    /// Forward to the reader.
    Item(EngineResult<StreamRead>),
    /// Nothing to act on (metadata, heartbeats, unrequested modes).
    Skip,
    /// Run finished.
    End,
}

/// Decode one SSE event (`event:` name, `data:` body).
pub(crate) fn decode_sse(event: &str, data: &str) -> SseOutcome {
    // Subgraph events arrive as `mode|namespace`.
    let name = event.split('|').next().unwrap_or(event);
    match name {
        "end" => return SseOutcome::End,
        "metadata" => return SseOutcome::Skip,
        "error" => return decode_error(data),
        _ => {}
    }

    let Some(mode) = StreamMode::from_event_name(name) else {
        debug!(event = %event, "ignoring unrequested stream event");
        return SseOutcome::Skip;
    };
    if data.trim().is_empty() {
        return SseOutcome::Skip;
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return SseOutcome::Item(Err(EngineError::Decode(format!(
                "{} event: {}",
                mode.as_str(),
                e
            ))))
        }
    };

    if mode == StreamMode::Updates {
        return if carries_interrupt(&payload) {
            SseOutcome::Item(Ok(StreamRead::Interrupted))
        } else {
            SseOutcome::Skip
        };
    }

    match EngineEvent::decode(mode, payload) {
        Some(event) => SseOutcome::Item(Ok(StreamRead::Event(event))),
        None => SseOutcome::Skip,
    }
}

fn decode_error(data: &str) -> SseOutcome {
    let (kind, message) = match serde_json::from_str::<Value>(data) {
        Ok(v) => (
            v.get("error").and_then(Value::as_str).unwrap_or_default().to_string(),
            v.get("message").and_then(Value::as_str).unwrap_or(data).to_string(),
        ),
        Err(_) => (String::new(), data.to_string()),
    };

    if kind == GRAPH_INTERRUPT || message.contains(GRAPH_INTERRUPT) {
        return SseOutcome::Item(Ok(StreamRead::Interrupted));
    }
    let detail = if kind.is_empty() {
        message
    } else {
        format!("{}: {}", kind, message)
    };
    SseOutcome::Item(Err(EngineError::Engine(detail)))
}

/// Turn raw SSE into engine reads. Terminal reads (`Interrupted`, errors) close the stream.
fn into_reads(events: SseEvents) -> EngineStream {
    stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            match events.next().await? {
                Err(e) => return Some((Err(EngineError::Stream(e.to_string())), None)),
                Ok(sse) => match decode_sse(&sse.event, &sse.data) {
                    SseOutcome::Skip => continue,
                    SseOutcome::End => return None,
                    SseOutcome::Item(Ok(StreamRead::Event(event))) => {
                        return Some((Ok(StreamRead::Event(event)), Some(events)))
                    }
                    SseOutcome::Item(terminal) => return Some((terminal, None)),
                },
            }
        }
    })
    .boxed()
}

/// Client for a LangGraph-compatible server.
#[derive(Debug, Clone)]
pub struct RemoteGraph {
    settings: EngineSettings,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteGraph {
    /// Build a client. Only connecting is time-bounded here; run streams stay open as long
    /// as the server keeps producing.
    pub fn new(settings: EngineSettings) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(transport)?;
        let base_url = settings.url.trim_end_matches('/').to_string();
        Ok(Self {
            settings,
            base_url,
            client,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn thread_url(&self, config: &RunConfig, path: &str) -> String {
        format!("{}/threads/{}/{}", self.base_url, config.thread_id(), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    fn run_body(&self, input: &EngineInput, config: &RunConfig, modes: &[StreamMode]) -> Value {
        let mut body = Map::new();
        body.insert("assistant_id".into(), Value::String(self.settings.assistant_id.clone()));
        if let Some(command) = input.to_command_json() {
            body.insert("command".into(), command);
        }
        if let Some(graph_input) = input.to_input_json() {
            body.insert("input".into(), graph_input);
        }
        body.insert("config".into(), config.to_json());
        body.insert(
            "stream_mode".into(),
            Value::Array(
                modes
                    .iter()
                    .map(|m| Value::String(m.wire_name().to_string()))
                    .collect(),
            ),
        );
        body.insert("if_not_exists".into(), Value::String("create".into()));
        Value::Object(body)
    }

    async fn check(response: reqwest::Response) -> EngineResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl DialogueEngine for RemoteGraph {
    async fn stream(
        &self,
        input: EngineInput,
        config: &RunConfig,
        modes: &[StreamMode],
    ) -> EngineResult<EngineStream> {
        let url = self.thread_url(config, "runs/stream");
        let body = self.run_body(&input, config, modes);
        info!(
            session = %config.thread_id(),
            resume = input.is_resume(),
            assistant = %self.settings.assistant_id,
            "🚀 Starting remote run"
        );

        let response = self
            .authorize(self.client.post(&url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response).await?;

        Ok(into_reads(response.bytes_stream().eventsource().boxed()))
    }

    async fn state(&self, config: &RunConfig) -> EngineResult<SessionState> {
        let url = self.thread_url(config, "state");
        let response = self
            .authorize(self.client.get(&url))
            .timeout(self.settings.request_timeout())
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response).await?;
        let text = response.text().await.map_err(transport)?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(session = %config.thread_id(), error = %e, "session state did not decode");
            EngineError::Decode(e.to_string())
        })
    }
}
