//! Pipeline-facing chat types: the history the voice pipeline hands us and the
//! fragments it pulls back out.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::convert::fragment_id;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    Developer,
    User,
    Assistant,
}

/// Image reference inside a message. Only URL sources can be forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    /// `http(s)://` or `data:` URL.
    Url(String),
    /// Raw decoded frame captured by the pipeline (e.g. a video track snapshot).
    Frame {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// Any other source shape; never forwarded.
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    #[serde(default)]
    pub id: Option<String>,
    pub image: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioContent {
    /// 16-bit PCM frames.
    pub frame: Vec<i16>,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// One part of a multi-part message.
///
/// Text arrives either as a bare string or as an object carrying `text` (optionally
/// tagged `"type": "text"`). Parts of any other shape land in `Unknown` so one odd
/// part never rejects the whole message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentPart {
    Text(String),
    Image(ImageContent),
    Audio(AudioContent),
    Unknown(Value),
}

impl ContentPart {
    fn from_value(value: Value) -> Self {
        let map = match value {
            Value::Object(map) => map,
            Value::String(text) => return ContentPart::Text(text),
            other => return ContentPart::Unknown(other),
        };
        let tag = map.get("type").and_then(Value::as_str);
        if let (Some(Value::String(text)), None | Some("text")) = (map.get("text"), tag) {
            return ContentPart::Text(text.clone());
        }
        let object = Value::Object(map);
        if object.get("image").is_some() {
            if let Ok(image) = serde_json::from_value(object.clone()) {
                return ContentPart::Image(image);
            }
        } else if object.get("frame").is_some() {
            if let Ok(audio) = serde_json::from_value(object.clone()) {
                return ContentPart::Audio(audio);
            }
        }
        ContentPart::Unknown(object)
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(ContentPart::from_value)
    }
}

/// Message body as produced by the pipeline.
///
/// `Other` holds shapes the host could not type (it still round-trips through serde);
/// the converter treats it as empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(Value),
}

impl From<&str> for ChatContent {
    fn from(s: &str) -> Self {
        ChatContent::Text(s.to_string())
    }
}

impl From<String> for ChatContent {
    fn from(s: String) -> Self {
        ChatContent::Text(s)
    }
}

impl From<Vec<ContentPart>> for ChatContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        ChatContent::Parts(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<ChatContent>) -> Self {
        Self {
            id: format!("item_{}", fragment_id()),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<ChatContent>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<ChatContent>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn system(content: impl Into<ChatContent>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Tool invocation recorded by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    pub call_id: String,
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Entry of the chat history. Only `Message` items are read by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatItem {
    Message(ChatMessage),
    FunctionCall(FunctionCall),
    FunctionCallOutput(FunctionCallOutput),
}

/// Ordered conversation history owned by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    pub items: Vec<ChatItem>,
}

impl ChatContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<ChatItem>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: ChatItem) {
        self.items.push(item);
    }

    /// Append a message and return its generated id.
    pub fn add_message(&mut self, role: ChatRole, content: impl Into<ChatContent>) -> String {
        let message = ChatMessage::new(role, content);
        let id = message.id.clone();
        self.items.push(ChatItem::Message(message));
        id
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> {
        self.items.iter().filter_map(|item| match item {
            ChatItem::Message(m) => Some(m),
            _ => None,
        })
    }

    /// Most recent message spoken by the user, if any.
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages().rev().find(|m| m.role == ChatRole::User)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Tool definition offered by the pipeline. The engine owns tool execution, so these are
/// accepted for contract compatibility only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Function { name: String },
}

/// Connection behaviour for opening a turn against the engine.
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | max_retry | 3 | Extra attempts while the engine cannot be reached. |
/// | retry_interval_ms | 2000 | Pause between attempts. |
/// | timeout_ms | 10000 | Bound on each open attempt. |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retry() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    2000
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            retry_interval_ms: default_retry_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ConnectOptions {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Content of an outbound delta. `Flush` marks "utterance complete, synthesize now" and can
/// never be mistaken for text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaContent {
    Text(String),
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    pub role: ChatRole,
    pub content: DeltaContent,
}

/// One incremental unit of assistant output handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub delta: ChoiceDelta,
}

impl ChatChunk {
    pub fn text(&self) -> Option<&str> {
        match &self.delta.content {
            DeltaContent::Text(t) => Some(t),
            DeltaContent::Flush => None,
        }
    }

    pub fn is_flush(&self) -> bool {
        matches!(self.delta.content, DeltaContent::Flush)
    }
}
