//! Dialogue-engine protocol types.
//!
//! Everything the engine sends is decoded exactly once, at the boundary, by
//! [`EngineEvent::decode`]. Downstream code only ever matches on the closed
//! [`EngineEvent`] / [`StreamRead`] variant sets.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::session::SessionKey;

/// Content block of a multi-part engine message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenated text blocks; images are skipped.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(t) => t.is_empty(),
            MessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// Message in the engine's own representation (`{"type": "human", "content": ..., "id": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineMessage {
    Human {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Ai {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    System {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl EngineMessage {
    pub fn human(content: MessageContent, id: Option<String>) -> Self {
        EngineMessage::Human { content, id }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        EngineMessage::Ai {
            content: MessageContent::Text(text.into()),
            id: None,
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            EngineMessage::Human { content, .. }
            | EngineMessage::Ai { content, .. }
            | EngineMessage::System { content, .. } => content,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            EngineMessage::Human { id, .. }
            | EngineMessage::Ai { id, .. }
            | EngineMessage::System { id, .. } => id.as_deref(),
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, EngineMessage::Human { .. })
    }
}

/// Wire shape of the resume payload. Engines disagree on it, so it is pinned per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeFormat {
    /// `[trigger, messages]`
    #[default]
    Tuple,
    /// `trigger` only.
    Text,
    /// `{"text": trigger, "messages": messages}`
    Structured,
}

/// Continue a session past a pending interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeCommand {
    /// Content of the user message answering the interrupt.
    pub trigger: MessageContent,
    /// Short reconstruction: the interrupt as an AI message, then the user message.
    pub messages: Vec<EngineMessage>,
    pub format: ResumeFormat,
}

impl ResumeCommand {
    pub fn resume_value(&self) -> Value {
        match self.format {
            ResumeFormat::Tuple => json!([self.trigger, self.messages]),
            ResumeFormat::Text => json!(self.trigger),
            ResumeFormat::Structured => json!({
                "text": self.trigger,
                "messages": self.messages,
            }),
        }
    }

    /// `{"resume": ...}` as submitted in place of graph input.
    pub fn to_command_json(&self) -> Value {
        json!({ "resume": self.resume_value() })
    }
}

/// What one turn submits to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// `{"messages": [...]}` with at most the latest user message.
    Fresh { messages: Vec<EngineMessage> },
    Resume(ResumeCommand),
}

impl EngineInput {
    pub fn fresh(message: Option<EngineMessage>) -> Self {
        EngineInput::Fresh {
            messages: message.into_iter().collect(),
        }
    }

    /// Graph input body, `None` for resume commands.
    pub fn to_input_json(&self) -> Option<Value> {
        match self {
            EngineInput::Fresh { messages } => Some(json!({ "messages": messages })),
            EngineInput::Resume(_) => None,
        }
    }

    pub fn to_command_json(&self) -> Option<Value> {
        match self {
            EngineInput::Fresh { .. } => None,
            EngineInput::Resume(cmd) => Some(cmd.to_command_json()),
        }
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, EngineInput::Resume(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configurable {
    pub thread_id: SessionKey,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-session run configuration: `{"configurable": {"thread_id": ...}}` plus anything extra
/// the engine understands (tags, metadata, recursion limits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub configurable: Configurable,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunConfig {
    pub fn for_session(thread_id: SessionKey) -> Self {
        Self {
            configurable: Configurable {
                thread_id,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn thread_id(&self) -> &SessionKey {
        &self.configurable.thread_id
    }

    pub fn with_configurable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configurable.extra.insert(key.into(), value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            json!({ "configurable": { "thread_id": self.thread_id().as_str() } })
        })
    }
}

/// Channel of the engine's multiplexed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Model token deltas.
    Messages,
    /// Named signals written by graph nodes (`say`, `flush`, ...).
    Custom,
    /// Per-node state updates; only inspected for interrupts.
    Updates,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Messages => "messages",
            StreamMode::Custom => "custom",
            StreamMode::Updates => "updates",
        }
    }

    /// Name to request over HTTP. The server's `messages` mode streams `[chunk, metadata]`
    /// tuples only when asked for `messages-tuple`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            StreamMode::Messages => "messages-tuple",
            StreamMode::Custom => "custom",
            StreamMode::Updates => "updates",
        }
    }

    /// Mode for an SSE event name, if it is one we consume.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "messages" | "messages-tuple" => Some(StreamMode::Messages),
            "custom" => Some(StreamMode::Custom),
            "updates" => Some(StreamMode::Updates),
            _ => None,
        }
    }
}

/// Fragment payload as found in the engine stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineFragment {
    /// Bare string.
    Text(String),
    /// Message chunk; `content` is a string for plain text deltas.
    Chunk { id: Option<String>, content: Value },
    /// Anything else (numbers, lists, ...). Never converted.
    Opaque(Value),
}

impl EngineFragment {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(EngineFragment::Text(s)),
            Value::Object(mut obj) => {
                let id = obj.get("id").and_then(Value::as_str).map(str::to_string);
                let content = obj.remove("content").unwrap_or(Value::Null);
                Some(EngineFragment::Chunk { id, content })
            }
            other => Some(EngineFragment::Opaque(other)),
        }
    }
}

/// Decoded event of the engine stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Assistant-content delta.
    ModelFragment(EngineFragment),
    /// Deliver literal content, then flush.
    Say { content: Option<EngineFragment> },
    /// Utterance boundary.
    Flush,
    /// Unrecognized custom signal.
    Custom { name: String },
}

impl EngineEvent {
    /// Decode one `(mode, payload)` pair. `None` means "nothing to act on".
    pub fn decode(mode: StreamMode, payload: Value) -> Option<Self> {
        match mode {
            StreamMode::Messages => {
                let chunk = match payload {
                    Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
                    other => other,
                };
                EngineFragment::from_value(chunk).map(EngineEvent::ModelFragment)
            }
            StreamMode::Custom => {
                let obj = payload.as_object()?;
                let name = obj.get("type")?.as_str()?;
                match name {
                    "say" => Some(EngineEvent::Say {
                        content: obj
                            .get("data")
                            .and_then(|d| d.get("content"))
                            .cloned()
                            .and_then(EngineFragment::from_value),
                    }),
                    "flush" => Some(EngineEvent::Flush),
                    other => Some(EngineEvent::Custom {
                        name: other.to_string(),
                    }),
                }
            }
            StreamMode::Updates => None,
        }
    }
}

/// True when an `updates` payload reports that the run paused on an interrupt.
pub fn carries_interrupt(payload: &Value) -> bool {
    payload
        .as_object()
        .map(|obj| obj.contains_key("__interrupt__"))
        .unwrap_or(false)
}

/// Item read from an engine stream. `Interrupted` is terminal: the run paused for
/// human input and no further events follow.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRead {
    Event(EngineEvent),
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Interrupt {
    pub fn new(value: Value) -> Self {
        Self { value, id: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub interrupts: Vec<Interrupt>,
}

/// Snapshot of a session as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub tasks: Vec<PendingTask>,
}

impl SessionState {
    /// All interrupts across tasks, in task order.
    pub fn interrupts(&self) -> impl DoubleEndedIterator<Item = &Interrupt> {
        self.tasks.iter().flat_map(|t| t.interrupts.iter())
    }

    /// Most recently raised interrupt whose value is a string.
    pub fn latest_text_interrupt(&self) -> Option<&str> {
        self.interrupts().rev().find_map(|i| i.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::derive_session_key;

    #[test]
    fn human_message_wire_shape() {
        let msg = EngineMessage::human(MessageContent::Text("hi".into()), Some("m1".into()));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "human", "content": "hi", "id": "m1"})
        );
    }

    #[test]
    fn block_content_wire_shape() {
        let msg = EngineMessage::human(
            MessageContent::Blocks(vec![
                ContentBlock::Text { text: "look".into() },
                ContentBlock::ImageUrl { image_url: "https://x/y.png".into() },
            ]),
            None,
        );
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "human", "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": "https://x/y.png"}
            ]})
        );
    }

    #[test]
    fn resume_formats() {
        let cmd = ResumeCommand {
            trigger: MessageContent::Text("yes".into()),
            messages: vec![EngineMessage::ai("Confirm purchase?")],
            format: ResumeFormat::Tuple,
        };
        assert_eq!(
            cmd.to_command_json(),
            json!({"resume": ["yes", [{"type": "ai", "content": "Confirm purchase?"}]]})
        );

        let text = ResumeCommand { format: ResumeFormat::Text, ..cmd.clone() };
        assert_eq!(text.resume_value(), json!("yes"));

        let structured = ResumeCommand { format: ResumeFormat::Structured, ..cmd };
        assert_eq!(structured.resume_value()["text"], json!("yes"));
        assert_eq!(structured.resume_value()["messages"][0]["type"], json!("ai"));
    }

    #[test]
    fn fresh_input_json() {
        let input = EngineInput::fresh(None);
        assert_eq!(input.to_input_json(), Some(json!({"messages": []})));
        assert_eq!(input.to_command_json(), None);
    }

    #[test]
    fn run_config_wire_shape() {
        let key = derive_session_key(Some("PA_abc"));
        let cfg = RunConfig::for_session(key.clone())
            .with_configurable("user_tier", json!("gold"))
            .with_extra("recursion_limit", json!(25));
        let v = cfg.to_json();
        assert_eq!(v["configurable"]["thread_id"], json!(key.as_str()));
        assert_eq!(v["configurable"]["user_tier"], json!("gold"));
        assert_eq!(v["recursion_limit"], json!(25));
    }

    #[test]
    fn decode_message_tuple_and_bare_chunk() {
        let tuple = json!([
            {"type": "AIMessageChunk", "content": "It's", "id": "run-1"},
            {"langgraph_node": "agent"}
        ]);
        assert_eq!(
            EngineEvent::decode(StreamMode::Messages, tuple),
            Some(EngineEvent::ModelFragment(EngineFragment::Chunk {
                id: Some("run-1".into()),
                content: json!("It's"),
            }))
        );

        let bare = json!("sunny");
        assert_eq!(
            EngineEvent::decode(StreamMode::Messages, bare),
            Some(EngineEvent::ModelFragment(EngineFragment::Text("sunny".into())))
        );
        assert_eq!(EngineEvent::decode(StreamMode::Messages, Value::Null), None);
    }

    #[test]
    fn decode_custom_signals() {
        assert_eq!(
            EngineEvent::decode(
                StreamMode::Custom,
                json!({"type": "say", "data": {"content": "One moment."}})
            ),
            Some(EngineEvent::Say {
                content: Some(EngineFragment::Text("One moment.".into()))
            })
        );
        assert_eq!(
            EngineEvent::decode(StreamMode::Custom, json!({"type": "say"})),
            Some(EngineEvent::Say { content: None })
        );
        assert_eq!(
            EngineEvent::decode(StreamMode::Custom, json!({"type": "flush"})),
            Some(EngineEvent::Flush)
        );
        assert_eq!(
            EngineEvent::decode(StreamMode::Custom, json!({"type": "progress", "data": 0.5})),
            Some(EngineEvent::Custom { name: "progress".into() })
        );
        assert_eq!(EngineEvent::decode(StreamMode::Custom, json!("say")), None);
        assert_eq!(EngineEvent::decode(StreamMode::Custom, json!({"data": {}})), None);
    }

    #[test]
    fn updates_are_not_events() {
        let payload = json!({"__interrupt__": [{"value": "Confirm?"}]});
        assert!(carries_interrupt(&payload));
        assert_eq!(EngineEvent::decode(StreamMode::Updates, payload), None);
        assert!(!carries_interrupt(&json!({"agent": {}})));
    }

    #[test]
    fn latest_text_interrupt_skips_non_strings() {
        let state: SessionState = serde_json::from_value(json!({
            "tasks": [
                {"id": "t1", "interrupts": [{"value": "first"}]},
                {"id": "t2", "interrupts": [{"value": "second"}, {"value": {"kind": "form"}}]},
                {"id": "t3", "interrupts": []}
            ],
            "values": {"messages": []},
            "next": ["agent"]
        }))
        .unwrap();
        assert_eq!(state.latest_text_interrupt(), Some("second"));
        assert_eq!(SessionState::default().latest_text_interrupt(), None);
    }

    #[test]
    fn stream_mode_names() {
        assert_eq!(StreamMode::from_event_name("messages"), Some(StreamMode::Messages));
        assert_eq!(StreamMode::from_event_name("messages-tuple"), Some(StreamMode::Messages));
        assert_eq!(StreamMode::from_event_name("metadata"), None);
        assert_eq!(StreamMode::Messages.wire_name(), "messages-tuple");
    }
}
