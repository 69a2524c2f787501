//! Engine configuration.
//!
//! Every field has a serde default, so a partial (or empty) settings document
//! deserializes into a usable configuration.

use serde::{Deserialize, Serialize};

use crate::run::TokenUsage;

/// Price per token, in whatever currency unit the deployment reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTable {
    #[serde(default)]
    pub prompt: f64,
    #[serde(default)]
    pub completion: f64,
}

impl CostTable {
    pub fn estimate(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 * self.prompt + usage.completion_tokens as f64 * self.completion
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Iterations allowed in one state before falling back or failing.
    /// A state's own `max_iterations` takes precedence.
    pub max_iterations_per_state: u32,
    /// Iterations allowed across one `process_message` call.
    pub max_total_iterations: u32,
    /// Gate tool calls even when the backend claims enforced tool choice.
    pub enable_policy_gate: bool,
    pub cost_per_token: CostTable,
    /// Trailing history messages sent with each backend call.
    pub history_window: usize,
    /// Tool descriptions longer than this many characters are truncated.
    pub tool_description_max_len: usize,
    pub include_examples: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Upper bound on any single backend or tool call.
    pub call_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_state: 10,
            max_total_iterations: 50,
            enable_policy_gate: true,
            cost_per_token: CostTable::default(),
            history_window: 20,
            tool_description_max_len: 500,
            include_examples: true,
            temperature: None,
            max_tokens: None,
            call_timeout_ms: None,
        }
    }
}
