//! colloquy-core: shared types for the voice ↔ dialogue-engine bridge.
//!
//! Two vocabularies meet here:
//!
//! - the **pipeline side** ([`chat`]): chat history going in, `ChatChunk` fragments coming out;
//! - the **engine side** ([`engine`]): graph input/resume commands, the multiplexed event
//!   stream and session state with pending interrupts.
//!
//! [`convert`] maps between them. Apart from [`config`] reading its file and
//! environment, nothing in this crate performs I/O.

pub mod chat;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod session;
pub mod telemetry;

pub use chat::{
    AudioContent, ChatChunk, ChatContent, ChatContext, ChatItem, ChatMessage, ChatRole, ChoiceDelta,
    ConnectOptions, ContentPart, DeltaContent, FunctionCall, FunctionCallOutput, FunctionTool,
    ImageContent, ImageSource, ToolChoice,
};
pub use config::{AdapterConfig, EngineSettings};
pub use convert::{
    flush_fragment, fragment_id, text_fragment, to_engine_message, to_outbound_fragment,
};
pub use engine::{
    carries_interrupt, Configurable, ContentBlock, EngineEvent, EngineFragment, EngineInput,
    EngineMessage, Interrupt, MessageContent, PendingTask, ResumeCommand, ResumeFormat, RunConfig,
    SessionState, StreamMode, StreamRead,
};
pub use error::{EngineError, EngineResult};
pub use session::{derive_session_key, SessionKey, SESSION_NAMESPACE};
