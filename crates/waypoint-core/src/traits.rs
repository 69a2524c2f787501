//! Collaborator contracts consumed by the runtime.
//!
//! These traits define the complete boundary of the engine:
//!
//! - `ModelBackend`     — untrusted generator (may ignore tool restrictions)
//! - `ToolExecutor`     — runs external tools
//! - `MemoryStore`      — session state and long-term memory persistence
//! - `RunSink`          — append-only destination for finished runs
//! - `ToolGate`         — trusted allow-list check, consulted before any tool runs
//! - `ArgumentVerifier` — optional schema check of tool arguments
//!
//! The runtime wires them together; none of them calls another.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use waypoint_contracts::{
    error::EngineResult,
    message::{ChatMessage, ToolCall, ToolOutcome},
    policy::GateVerdict,
    run::{FinishReason, Run, TokenUsage},
    session::SessionState,
    spec::ToolDefinition,
    verify::VerificationReport,
};

use crate::compiler::{ToolChoice, ToolSpec};

/// One backend request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
    pub tool_choice: ToolChoice,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The assistant turn produced by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub message: AssistantTurn,
    pub usage: Option<TokenUsage>,
    pub finish_reason: FinishReason,
}

/// A language-model backend.
///
/// Implementations are **untrusted**: a backend may propose any tool call
/// regardless of the tool list it was given. The runtime never executes a
/// call without consulting the `ToolGate` unless the backend enforces tool
/// choice and the gate has been disabled by configuration.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce one assistant turn. Network or provider failures are
    /// `EngineError::Backend`.
    async fn chat(&self, request: ChatRequest<'_>) -> EngineResult<ChatResponse>;

    /// Whether the backend natively restricts calls to the offered tools.
    fn supports_tool_choice(&self) -> bool;

    /// Stable label for logs.
    fn name(&self) -> &'static str {
        "model_backend"
    }
}

/// Runs external (non-internal) tools.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with `arguments`.
    ///
    /// Ordinary tool failures must be reported as `ToolOutcome { success:
    /// false, .. }`. `Err` is reserved for transport failures that should end
    /// the run.
    async fn execute(
        &self,
        name: &str,
        definition: &ToolDefinition,
        arguments: &Value,
    ) -> EngineResult<ToolOutcome>;
}

/// Session and long-term memory persistence.
///
/// Caching and durability strategy belong to the implementation.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get_session_state(&self, session_id: &str) -> EngineResult<Option<SessionState>>;

    async fn set_session_state(&self, session_id: &str, state: &SessionState) -> EngineResult<()>;

    async fn get_long_term_memory(&self, namespace: &str, key: &str) -> EngineResult<Option<Value>>;

    async fn set_long_term_memory(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> EngineResult<()>;
}

/// Destination for finished runs, whatever their status.
///
/// The engine only appends; it never reads runs back.
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn append(&self, run: &Run) -> EngineResult<()>;
}

/// The tool gate: authoritative allow-list enforcement.
///
/// Implementations are **trusted** and must be pure functions of the
/// specification and the state identifier.
pub trait ToolGate: Send + Sync {
    /// Check a batch of proposed calls against `state_id`'s allow-list.
    fn validate(&self, state_id: &str, calls: &[ToolCall]) -> EngineResult<GateVerdict>;

    /// Build the corrective turn injected after a blocked batch.
    fn constraint_message(&self, state_id: &str, blocked: &[String]) -> EngineResult<String>;
}

/// Checks tool arguments before execution.
pub trait ArgumentVerifier: Send + Sync {
    fn verify(&self, tool_name: &str, definition: &ToolDefinition, arguments: &Value) -> VerificationReport;
}
