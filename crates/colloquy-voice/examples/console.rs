//! Example: talk to a dialogue engine from the terminal.
//!
//! Each line you type is one user turn; fragments print as they stream and a flush
//! boundary ends the printed line, the way a TTS stage would start speaking.
//!
//! ```text
//! cargo run -p colloquy-voice --example console            # remote engine from config/env
//! cargo run -p colloquy-voice --example console -- --local # in-process echo graph
//! ```

use std::io::Write;
use std::sync::Arc;

use colloquy_core::{telemetry, AdapterConfig, ChatContext, ChatRole, EngineResult};
use colloquy_engine::{MemorySessionStore, NodeContext, NodeInput, NodeOutcome, TurnHandler};
use colloquy_voice::{ChatModel, GraphAdapter};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// The user's reply inside a resume value, whichever resume format is configured.
fn answer_text(answer: &Value) -> String {
    let answer = match answer {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    match answer {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Echoes the user, and asks before "ordering" anything.
struct EchoGraph;

#[async_trait::async_trait]
impl TurnHandler for EchoGraph {
    async fn run(&self, input: NodeInput, ctx: NodeContext) -> EngineResult<NodeOutcome> {
        if let Some(answer) = input.resume {
            let reply = format!("You answered {}.", answer_text(&answer));
            ctx.token(&reply);
            return Ok(NodeOutcome::Complete { reply: Some(reply) });
        }

        let said = input.last_human_text().unwrap_or_default();
        if said.to_lowercase().starts_with("order") {
            ctx.say("Sure.");
            return Ok(NodeOutcome::Interrupt(json!(format!("Confirm: {}?", said))));
        }
        for word in said.split_inclusive(' ') {
            ctx.token(word);
        }
        ctx.flush();
        Ok(NodeOutcome::Complete { reply: Some(said) })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing("info,colloquy_voice=debug");

    let cfg = AdapterConfig::load()?;
    let local = std::env::args().any(|a| a == "--local");
    let adapter = if local {
        GraphAdapter::local(
            Arc::new(EchoGraph),
            Arc::new(MemorySessionStore::new()),
            cfg.run_config(),
        )
        .with_resume_format(cfg.resume_format)
    } else {
        GraphAdapter::from_config(&cfg)?
    };

    info!("💬 Colloquy console");
    info!(
        session = %adapter.config().thread_id(),
        engine = if local { "local" } else { cfg.engine.url.as_str() },
        "Type a message, Ctrl+D to quit"
    );

    let mut ctx = ChatContext::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        ctx.add_message(ChatRole::User, line);

        let mut reply = String::new();
        let mut stream = adapter.chat(&ctx, &[], None, None);
        let mut stdout = std::io::stdout();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) if chunk.is_flush() => writeln!(stdout)?,
                Ok(chunk) => {
                    let text = chunk.text().unwrap_or_default();
                    reply.push_str(text);
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
                Err(e) => {
                    writeln!(stdout, "\n[error] {}", e)?;
                    break;
                }
            }
        }
        writeln!(stdout)?;
        ctx.add_message(ChatRole::Assistant, reply);
    }

    Ok(())
}
