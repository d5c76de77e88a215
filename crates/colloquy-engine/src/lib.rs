//! colloquy-engine: the dialogue-engine seam and its two implementations.
//!
//! - [`RemoteGraph`]: LangGraph-compatible server over HTTP + SSE.
//! - [`LocalGraph`]: in-process graph over an injected [`SessionStore`].

pub mod local;
pub mod remote;
pub mod store;
pub mod traits;

pub use local::{LocalGraph, NodeContext, NodeInput, NodeOutcome, TurnHandler};
pub use remote::RemoteGraph;
pub use store::{Checkpoint, MemorySessionStore, SessionStore};
pub use traits::{DialogueEngine, EngineStream};
