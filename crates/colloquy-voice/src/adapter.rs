//! **Adapter facade**: presents a dialogue engine to the voice pipeline as a chat model.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

use colloquy_core::{
    to_engine_message, AdapterConfig, ChatChunk, ChatContext, ConnectOptions, EngineSettings,
    FunctionTool, ResumeFormat, RunConfig, ToolChoice,
};
use colloquy_engine::{DialogueEngine, LocalGraph, RemoteGraph, SessionStore, TurnHandler};

use crate::error::AdapterResult;
use crate::turn::{TurnOptions, TurnStream};

/// What the voice pipeline calls to get a reply.
pub trait ChatModel: Send + Sync {
    /// Start a reply to the latest user message in `ctx`.
    ///
    /// `conn_options` overrides the model's own connection behaviour for this call.
    fn chat(
        &self,
        ctx: &ChatContext,
        tools: &[FunctionTool],
        tool_choice: Option<ToolChoice>,
        conn_options: Option<ConnectOptions>,
    ) -> BoxStream<'static, AdapterResult<ChatChunk>>;
}

/// Dialogue engine behind the chat-model contract.
#[derive(Clone)]
pub struct GraphAdapter {
    engine: Arc<dyn DialogueEngine>,
    config: RunConfig,
    options: TurnOptions,
}

impl GraphAdapter {
    pub fn new(engine: Arc<dyn DialogueEngine>, config: RunConfig) -> Self {
        Self {
            engine,
            config,
            options: TurnOptions::default(),
        }
    }

    /// In-process engine over an explicit session store.
    pub fn local(
        handler: Arc<dyn TurnHandler>,
        store: Arc<dyn SessionStore>,
        config: RunConfig,
    ) -> Self {
        Self::new(Arc::new(LocalGraph::new(handler, store)), config)
    }

    /// LangGraph-compatible server at `settings.url`.
    pub fn remote(settings: EngineSettings, config: RunConfig) -> AdapterResult<Self> {
        Ok(Self::new(Arc::new(RemoteGraph::new(settings)?), config))
    }

    /// Remote adapter wired from loaded configuration.
    pub fn from_config(cfg: &AdapterConfig) -> AdapterResult<Self> {
        Ok(Self::remote(cfg.engine.clone(), cfg.run_config())?
            .with_resume_format(cfg.resume_format)
            .with_connect_options(cfg.connect))
    }

    pub fn with_resume_format(mut self, format: ResumeFormat) -> Self {
        self.options.resume_format = format;
        self
    }

    pub fn with_connect_options(mut self, connect: ConnectOptions) -> Self {
        self.options.connect = connect;
        self
    }

    /// Default run configuration used by [`ChatModel::chat`].
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn engine(&self) -> &Arc<dyn DialogueEngine> {
        &self.engine
    }

    /// Start a turn for `config`'s session. Must be called inside a tokio runtime.
    pub fn start_turn(&self, ctx: &ChatContext, config: RunConfig) -> TurnStream {
        self.spawn_turn(ctx, config, self.options)
    }

    fn spawn_turn(&self, ctx: &ChatContext, config: RunConfig, options: TurnOptions) -> TurnStream {
        let user = ctx.last_user_message().map(to_engine_message);
        TurnStream::spawn(Arc::clone(&self.engine), user, config, options)
    }
}

impl ChatModel for GraphAdapter {
    fn chat(
        &self,
        ctx: &ChatContext,
        tools: &[FunctionTool],
        tool_choice: Option<ToolChoice>,
        conn_options: Option<ConnectOptions>,
    ) -> BoxStream<'static, AdapterResult<ChatChunk>> {
        if !tools.is_empty() || tool_choice.is_some() {
            debug!(
                tools = tools.len(),
                tool_choice = ?tool_choice,
                "tools are executed by the engine, ignoring"
            );
        }
        let options = TurnOptions {
            connect: conn_options.unwrap_or(self.options.connect),
            ..self.options
        };
        self.spawn_turn(ctx, self.config.clone(), options).boxed()
    }
}
