//! Adapter configuration: defaults → optional TOML file → `COLLOQUY_*` environment.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | COLLOQUY_CONFIG | config/colloquy | Config file path (extension optional). |
//! | COLLOQUY_ENGINE__URL | http://localhost:2024 | Dialogue engine base URL. |
//! | COLLOQUY_ENGINE__ASSISTANT_ID | agent | Graph/assistant to run. |
//! | COLLOQUY_ENGINE__API_KEY | (unset) | Sent as `x-api-key` when set. |
//! | COLLOQUY_RESUME_FORMAT | tuple | `tuple` \| `text` \| `structured`. |
//! | COLLOQUY_CONNECT__MAX_RETRY | 3 | Open retries for a turn. |
//! | COLLOQUY_SESSION_ID | (unset) | Participant id the default session key is derived from. |

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chat::ConnectOptions;
use crate::engine::{ResumeFormat, RunConfig};
use crate::session::{derive_session_key, SessionKey};

const DEFAULT_CONFIG_PATH: &str = "config/colloquy";
const ENV_PREFIX: &str = "COLLOQUY";

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Where and how to reach the dialogue engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub url: String,
    pub assistant_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// TCP/TLS connect bound for every request.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total bound for non-streaming requests (state inspection).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:2024".to_string(),
            assistant_id: "agent".to_string(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl EngineSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub resume_format: ResumeFormat,
    #[serde(default)]
    pub connect: ConnectOptions,
    /// Raw participant/session id; absent means every process start gets a fresh thread.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AdapterConfig {
    /// Load `.env`, then the config file named by `COLLOQUY_CONFIG` (if it exists), then env.
    pub fn load() -> Result<Self, config::ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, ".env not loaded (using process environment)");
        }
        let path = std::env::var("COLLOQUY_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_with(&path, ENV_PREFIX)
    }

    /// Load from an explicit file path and environment prefix.
    pub fn load_with(path: &str, env_prefix: &str) -> Result<Self, config::ConfigError> {
        let defaults = EngineSettings::default();
        let built = config::Config::builder()
            .set_default("engine.url", defaults.url)?
            .set_default("engine.assistant_id", defaults.assistant_id)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        built.try_deserialize()
    }

    /// Session key for this process, derived from `session_id`.
    pub fn session_key(&self) -> SessionKey {
        derive_session_key(self.session_id.as_deref())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::for_session(self.session_key())
    }
}
