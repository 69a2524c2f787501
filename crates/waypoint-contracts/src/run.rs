//! Run and step records.
//!
//! A `Run` covers one `process_message` call. Each loop iteration appends one
//! `Step`; steps are never revised once recorded. The finished run is handed
//! to the run sink whatever its status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ToolCall, ToolOutcome};
use crate::spec::Trigger;

/// Unique identifier for one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other,
}

/// A state change that happened at the end of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    /// `None` for forced moves such as a fallback after an exhausted state.
    pub trigger: Option<Trigger>,
}

/// A tool result as recorded in a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

/// One loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    pub state_id: String,
    /// The user text; present only on the first step of a run.
    pub input: Option<String>,
    pub output: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResultRecord>,
    /// Tool names the gate refused in this step.
    #[serde(default)]
    pub blocked_tools: Vec<String>,
    pub transition: Option<TransitionRecord>,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
    pub recorded_at: DateTime<Utc>,
}

/// The record of one `process_message` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub session_id: String,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency_ms: u64,
    /// Message of the error that ended the run, if any.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn start(session_id: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            session_id: session_id.into(),
            status: RunStatus::Running,
            steps: Vec::new(),
            usage: TokenUsage::default(),
            cost: 0.0,
            latency_ms: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a step and fold its counters into the run totals.
    pub fn record(&mut self, step: Step) {
        self.usage.accumulate(&step.usage);
        self.cost += step.cost;
        self.latency_ms += step.latency_ms;
        self.steps.push(step);
    }

    /// Tool calls proposed across all steps, blocked ones included.
    pub fn tool_call_count(&self) -> usize {
        self.steps.iter().map(|s| s.tool_calls.len()).sum()
    }

    pub fn complete(&mut self) {
        self.finish(RunStatus::Completed, None);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.finish(RunStatus::Failed, Some(message.into()));
    }

    pub fn cancel(&mut self) {
        self.finish(RunStatus::Cancelled, Some("run cancelled".to_string()));
    }

    fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}
