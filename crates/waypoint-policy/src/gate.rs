//! The deny-by-default tool gate.
//!
//! `PolicyGate` implements the `ToolGate` trait from waypoint-core. It is a
//! stateless check keyed only by (specification, state id):
//!
//! 1. Compute the state's effective allow-list: state tools ∪ global tools ∪
//!    the four internal tools.
//! 2. Report every proposed call whose name is outside that set, once per
//!    name, in call order.
//! 3. A batch is allowed only if nothing was reported.
//!
//! The allow-list is the same one the prompt compiler renders from, so what
//! the model is shown and what the gate accepts never drift apart.

use std::sync::Arc;

use tracing::{debug, warn};

use waypoint_contracts::{
    error::EngineResult,
    message::ToolCall,
    policy::{FilteredCalls, GateVerdict},
    spec::Specification,
};
use waypoint_core::traits::ToolGate;

/// A `ToolGate` over one immutable specification.
///
/// ```rust,ignore
/// use waypoint_policy::PolicyGate;
///
/// let gate = PolicyGate::new(Arc::clone(&spec));
/// let verdict = gate.validate("triage", &calls)?;
/// ```
#[derive(Debug, Clone)]
pub struct PolicyGate {
    spec: Arc<Specification>,
}

impl PolicyGate {
    pub fn new(spec: Arc<Specification>) -> Self {
        Self { spec }
    }

    /// Check `calls` against `state_id`'s allow-list.
    ///
    /// Returns `EngineError::UnknownState` if `state_id` does not exist.
    pub fn validate(&self, state_id: &str, calls: &[ToolCall]) -> EngineResult<GateVerdict> {
        let allowed = self.spec.effective_allowed_tools(state_id)?;

        let mut blocked: Vec<String> = Vec::new();
        for call in calls {
            if !allowed.contains(&call.name) && !blocked.contains(&call.name) {
                blocked.push(call.name.clone());
            }
        }

        if blocked.is_empty() {
            debug!(state = %state_id, calls = calls.len(), "tool calls allowed");
            return Ok(GateVerdict::allow());
        }

        warn!(state = %state_id, blocked = ?blocked, "tool calls outside allow-list");
        Ok(GateVerdict {
            allowed: false,
            reason: Some(format!(
                "tool(s) {} not allowed in state '{}'",
                quoted(&blocked),
                state_id
            )),
            blocked,
        })
    }

    /// Partition `calls` into those on the allow-list and those off it.
    ///
    /// Never fails on a blocked call; only an unknown state is an error.
    pub fn filter(&self, state_id: &str, calls: &[ToolCall]) -> EngineResult<FilteredCalls> {
        let allowed = self.spec.effective_allowed_tools(state_id)?;
        let (ok, blocked): (Vec<ToolCall>, Vec<ToolCall>) = calls
            .iter()
            .cloned()
            .partition(|call| allowed.contains(&call.name));
        Ok(FilteredCalls {
            allowed: ok,
            blocked,
        })
    }

    /// The corrective user turn injected after a blocked batch.
    ///
    /// Names the blocked tools and lists the full allowed set so the model
    /// can retry with a permitted tool or answer directly.
    pub fn generate_constraint_message(&self, state_id: &str, blocked: &[String]) -> EngineResult<String> {
        let state = self.spec.require_state(state_id)?;
        let allowed: Vec<String> = self.spec.effective_allowed_tools(state_id)?.into_iter().collect();

        Ok(format!(
            "The tool call(s) {} are not permitted in the current state '{}'. \
             Allowed tools: {}. \
             Retry using only allowed tools, or answer the user directly without calling a tool.",
            quoted(blocked),
            state.name,
            quoted(&allowed),
        ))
    }
}

impl ToolGate for PolicyGate {
    fn validate(&self, state_id: &str, calls: &[ToolCall]) -> EngineResult<GateVerdict> {
        PolicyGate::validate(self, state_id, calls)
    }

    fn constraint_message(&self, state_id: &str, blocked: &[String]) -> EngineResult<String> {
        self.generate_constraint_message(state_id, blocked)
    }
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
