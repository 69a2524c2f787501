//! The agent specification model.
//!
//! A `Specification` is the immutable description of one agent: who it is,
//! which conversational states it moves through, and which tools each state
//! may call. It is produced by a loader/validator and only ever read by the
//! engine. Maps are `BTreeMap` so every traversal is ordered and the prompt
//! compiler stays deterministic.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::internal::INTERNAL_TOOL_NAMES;

/// Identity block rendered at the top of every prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable identifier (e.g. "symptom-triage"). Also scopes notes memory.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub problem_statement: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

/// How the agent must treat personally identifiable information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiHandling {
    /// The agent does not expect PII and must not ask for it.
    None,
    #[default]
    Mask,
    Redact,
    Allow,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        })
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        })
    }
}

impl fmt::Display for PiiHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PiiHandling::None => "none",
            PiiHandling::Mask => "mask",
            PiiHandling::Redact => "redact",
            PiiHandling::Allow => "allow",
        })
    }
}

/// Agent-wide policy flags rendered into every prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalPolicy {
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub data_classification: DataClassification,
    #[serde(default)]
    pub pii_handling: PiiHandling,
    /// Additional free-form rules, rendered in declaration order.
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Role of a prompt fragment inside a state section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentRole {
    IdentityContext,
    Instructions,
    Examples,
}

impl FragmentRole {
    /// Rendering order of role groups within a state section.
    pub const ORDER: [FragmentRole; 3] = [
        FragmentRole::IdentityContext,
        FragmentRole::Instructions,
        FragmentRole::Examples,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            FragmentRole::IdentityContext => "Context",
            FragmentRole::Instructions => "Instructions",
            FragmentRole::Examples => "Examples",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptFragment {
    pub role: FragmentRole,
    pub content: String,
    /// Higher renders first within the role group.
    #[serde(default)]
    pub priority: i32,
}

/// What makes a transition fire.
///
/// Serialized as `{ kind = "...", value = ... }` so specification documents
/// read the same way the triggers are described to authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    /// `|`-separated keywords matched against the latest user message.
    Intent(String),
    /// `<variable> <op> <value>` over the transition context.
    Condition(String),
    /// `toolName:outcome` over this iteration's tool results.
    ToolResult(String),
    /// Milliseconds since the state was entered.
    Timeout(u64),
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Intent(_) => "intent",
            Trigger::Condition(_) => "condition",
            Trigger::ToolResult(_) => "tool_result",
            Trigger::Timeout(_) => "timeout",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Intent(v) => write!(f, "intent \"{v}\""),
            Trigger::Condition(v) => write!(f, "condition \"{v}\""),
            Trigger::ToolResult(v) => write!(f, "tool result \"{v}\""),
            Trigger::Timeout(ms) => write!(f, "timeout after {ms}ms"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub trigger: Trigger,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
}

/// One conversational state of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: Vec<PromptFragment>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub terminal: bool,
    /// Overrides the engine-wide `max_iterations_per_state` for this state.
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

impl StateSpec {
    /// Transitions in evaluation order: descending priority, declaration
    /// order among equals (`sort_by` is stable).
    pub fn transitions_by_priority(&self) -> Vec<&Transition> {
        let mut ordered: Vec<&Transition> = self.transitions.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
    }
}

/// How an external tool is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolTransport {
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
    },
    Mcp {
        server: String,
        /// Tool name on the MCP server when it differs from the registry key.
        #[serde(default)]
        tool: Option<String>,
    },
    /// Handled inside the engine. Only the reserved internal tools use this.
    Internal,
}

fn default_http_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub description: String,
    /// JSON Schema for the call arguments.
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
    pub transport: ToolTransport,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object" })
}

/// The complete, immutable agent description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub agent: AgentIdentity,
    #[serde(default)]
    pub policy: GlobalPolicy,
    pub initial_state: String,
    #[serde(default)]
    pub fallback_state: Option<String>,
    #[serde(default)]
    pub global_allowed_tools: Vec<String>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolDefinition>,
    /// Explicit appendix order; tools not listed follow alphabetically.
    #[serde(default)]
    pub tool_order: Option<Vec<String>>,
    pub states: Vec<StateSpec>,
}

impl Specification {
    pub fn state(&self, state_id: &str) -> Option<&StateSpec> {
        self.states.iter().find(|s| s.id == state_id)
    }

    pub fn require_state(&self, state_id: &str) -> EngineResult<&StateSpec> {
        self.state(state_id)
            .ok_or_else(|| EngineError::unknown_state(state_id))
    }

    /// `global_allowed_tools ∪ state.allowed_tools`, without internal tools.
    pub fn declared_tools(&self, state_id: &str) -> EngineResult<BTreeSet<String>> {
        let state = self.require_state(state_id)?;
        Ok(self
            .global_allowed_tools
            .iter()
            .chain(state.allowed_tools.iter())
            .cloned()
            .collect())
    }

    /// The full allow-list of a state: declared tools plus the four internal
    /// tools. Both the prompt compiler and the policy gate derive from this,
    /// so what the model is shown and what the gate accepts cannot drift.
    pub fn effective_allowed_tools(&self, state_id: &str) -> EngineResult<BTreeSet<String>> {
        let mut allowed = self.declared_tools(state_id)?;
        allowed.extend(INTERNAL_TOOL_NAMES.iter().map(|n| n.to_string()));
        Ok(allowed)
    }

    /// Cheap reference check the engine runs before use.
    ///
    /// The loader in `waypoint-verify` performs the full validation; this
    /// only guarantees that every state identifier and tool name the engine
    /// may follow actually resolves.
    pub fn check_references(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for state in &self.states {
            if !seen.insert(state.id.as_str()) {
                return Err(EngineError::InvalidSpecification {
                    reason: format!("duplicate state id '{}'", state.id),
                });
            }
        }

        self.require_state(&self.initial_state)?;
        if let Some(fallback) = &self.fallback_state {
            self.require_state(fallback)?;
        }

        for state in &self.states {
            for transition in &state.transitions {
                self.require_state(&transition.target)?;
            }
        }

        let known = |name: &str| self.tools.contains_key(name) || INTERNAL_TOOL_NAMES.contains(&name);
        let referenced = self
            .global_allowed_tools
            .iter()
            .map(|t| (None, t))
            .chain(
                self.states
                    .iter()
                    .flat_map(|s| s.allowed_tools.iter().map(move |t| (Some(&s.id), t))),
            );
        for (state_id, tool) in referenced {
            if !known(tool) {
                let location = match state_id {
                    Some(id) => format!("state '{id}'"),
                    None => "global_allowed_tools".to_string(),
                };
                return Err(EngineError::InvalidSpecification {
                    reason: format!("{location} allows unregistered tool '{tool}'"),
                });
            }
        }

        Ok(())
    }
}
