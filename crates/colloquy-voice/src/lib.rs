//! colloquy-voice: a dialogue engine as a streaming chat model for voice pipelines.
//!
//! Each user turn becomes one engine run. Model tokens come back as text fragments,
//! `say` signals as text followed by a flush, and a session paused on a question
//! ends the turn by speaking that question. The next turn answers it.

pub mod adapter;
pub mod error;
pub mod inspector;
pub mod turn;

pub use adapter::{ChatModel, GraphAdapter};
pub use error::{AdapterError, AdapterResult};
pub use inspector::InterruptInspector;
pub use turn::{build_input, TurnOptions, TurnPhase, TurnStream, TURN_MODES};
