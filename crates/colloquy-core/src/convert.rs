//! Pure conversions between pipeline chat types and engine protocol types.
//!
//! Malformed input degrades to "no fragment" (or empty text); nothing here fails a turn.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::chat::{
    ChatChunk, ChatContent, ChatMessage, ChatRole, ChoiceDelta, ContentPart, DeltaContent,
    ImageSource,
};
use crate::engine::{ContentBlock, EngineFragment, EngineMessage, MessageContent};

/// Short random id for outbound fragments (12 hex chars).
pub fn fragment_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Pipeline message → engine human message, keeping its id.
pub fn to_engine_message(msg: &ChatMessage) -> EngineMessage {
    let content = match &msg.content {
        ChatContent::Text(text) => MessageContent::Text(text.clone()),
        ChatContent::Parts(parts) => {
            let mut blocks = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text(text) => {
                        blocks.push(ContentBlock::Text { text: text.clone() })
                    }
                    ContentPart::Image(image) => match &image.image {
                        ImageSource::Url(url) => blocks.push(ContentBlock::ImageUrl {
                            image_url: url.clone(),
                        }),
                        ImageSource::Frame { .. } | ImageSource::Unknown(_) => {
                            warn!(message_id = %msg.id, "unsupported image type, dropping part");
                        }
                    },
                    ContentPart::Audio(_) | ContentPart::Unknown(_) => {
                        warn!(message_id = %msg.id, "unsupported content type, dropping part");
                    }
                }
            }
            MessageContent::Blocks(blocks)
        }
        ChatContent::Other(_) => MessageContent::Text(String::new()),
    };
    EngineMessage::human(content, Some(msg.id.clone()))
}

pub fn text_fragment(text: impl Into<String>, id: Option<String>) -> ChatChunk {
    ChatChunk {
        id: id.unwrap_or_else(fragment_id),
        delta: ChoiceDelta {
            role: ChatRole::Assistant,
            content: DeltaContent::Text(text.into()),
        },
    }
}

/// Flush marker with a fresh id.
pub fn flush_fragment() -> ChatChunk {
    ChatChunk {
        id: fragment_id(),
        delta: ChoiceDelta {
            role: ChatRole::Assistant,
            content: DeltaContent::Flush,
        },
    }
}

/// Engine fragment → pipeline chunk. `None` means nothing should be emitted.
pub fn to_outbound_fragment(fragment: Option<&EngineFragment>) -> Option<ChatChunk> {
    match fragment? {
        EngineFragment::Text(text) if text.is_empty() => None,
        EngineFragment::Text(text) => Some(text_fragment(text.as_str(), None)),
        EngineFragment::Chunk { id, content } => match content.as_str() {
            Some(text) => Some(text_fragment(text, id.clone())),
            None => {
                debug!(fragment_id = ?id, "skipping fragment with non-text content");
                None
            }
        },
        EngineFragment::Opaque(value) => {
            debug!(%value, "skipping opaque fragment");
            None
        }
    }
}
