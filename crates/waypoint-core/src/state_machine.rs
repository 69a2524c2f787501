//! The conversational state machine.
//!
//! Holds a pointer into the specification's states plus the instant the
//! current state was entered. Transitions are evaluated in priority order and
//! the first matching trigger wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use waypoint_contracts::{
    error::EngineResult,
    spec::{Specification, StateSpec, Trigger},
};

use crate::condition::{self, ConditionScope};

/// A tool result as seen by `tool_result` triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultView {
    pub name: String,
    pub success: bool,
    /// Serialized tool output.
    pub output: String,
}

/// Everything a trigger may read.
#[derive(Debug, Clone)]
pub struct TransitionContext<'a> {
    pub latest_user_message: Option<&'a str>,
    pub latest_assistant_message: Option<&'a str>,
    /// Results of the current iteration only.
    pub tool_results: Vec<ToolResultView>,
    pub metadata: &'a Map<String, Value>,
    /// Iterations spent in the current state.
    pub iteration: u32,
    /// Tool calls made in the current state.
    pub tool_calls_count: u32,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub transitioned: bool,
    pub from: String,
    pub to: String,
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    spec: Arc<Specification>,
    current: String,
    entered_at: DateTime<Utc>,
}

impl StateMachine {
    /// Start at `start`, or at the specification's initial state.
    pub fn new(spec: Arc<Specification>, start: Option<&str>) -> EngineResult<Self> {
        let current = start.unwrap_or(&spec.initial_state).to_string();
        spec.require_state(&current)?;
        Ok(Self {
            spec,
            current,
            entered_at: Utc::now(),
        })
    }

    /// Rebuild a machine from persisted session state.
    pub fn resume(
        spec: Arc<Specification>,
        state_id: &str,
        entered_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        spec.require_state(state_id)?;
        Ok(Self {
            spec,
            current: state_id.to_string(),
            entered_at,
        })
    }

    pub fn current_state_id(&self) -> &str {
        &self.current
    }

    pub fn current_state(&self) -> EngineResult<&StateSpec> {
        self.spec.require_state(&self.current)
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    pub fn is_terminal(&self) -> bool {
        self.spec
            .state(&self.current)
            .is_some_and(|state| state.terminal)
    }

    /// Apply the first matching transition of the current state.
    ///
    /// # Errors
    ///
    /// `UnknownState` if the matching transition targets a state that does
    /// not exist. The pointer is left unchanged in that case.
    pub fn evaluate_transitions(
        &mut self,
        context: &TransitionContext<'_>,
    ) -> EngineResult<TransitionOutcome> {
        let state = self.spec.require_state(&self.current)?;
        let from = self.current.clone();

        let matched = state
            .transitions_by_priority()
            .into_iter()
            .find(|t| self.trigger_matches(&t.trigger, context))
            .cloned();

        let Some(transition) = matched else {
            return Ok(TransitionOutcome {
                transitioned: false,
                to: from.clone(),
                from,
                trigger: None,
            });
        };

        self.spec.require_state(&transition.target)?;
        info!(
            from = %from,
            to = %transition.target,
            trigger = %transition.trigger,
            "state transition"
        );
        self.enter(&transition.target, context.now);

        Ok(TransitionOutcome {
            transitioned: true,
            from,
            to: transition.target,
            trigger: Some(transition.trigger),
        })
    }

    /// Forced move to `state_id`.
    pub fn transition_to(&mut self, state_id: &str) -> EngineResult<()> {
        self.spec.require_state(state_id)?;
        debug!(from = %self.current, to = %state_id, "forced transition");
        self.enter(state_id, Utc::now());
        Ok(())
    }

    /// Move to the fallback state. Returns `false` when none is configured or
    /// it is already active.
    pub fn go_to_fallback(&mut self) -> bool {
        let Some(fallback) = self.spec.fallback_state.clone() else {
            return false;
        };
        if fallback == self.current || self.spec.state(&fallback).is_none() {
            return false;
        }
        info!(from = %self.current, to = %fallback, "falling back");
        self.enter(&fallback, Utc::now());
        true
    }

    fn enter(&mut self, state_id: &str, at: DateTime<Utc>) {
        self.current = state_id.to_string();
        self.entered_at = at;
    }

    fn trigger_matches(&self, trigger: &Trigger, context: &TransitionContext<'_>) -> bool {
        match trigger {
            Trigger::Intent(keywords) => context
                .latest_user_message
                .is_some_and(|text| intent_matches(keywords, text)),
            Trigger::Condition(expression) => {
                let scope = ConditionScope {
                    metadata: context.metadata,
                    iteration: context.iteration,
                    tool_calls_count: context.tool_calls_count,
                };
                match condition::parse(expression) {
                    Ok(parsed) => parsed.evaluate(&scope),
                    Err(e) => {
                        debug!(state = %self.current, expression = %expression, error = %e, "condition does not parse");
                        false
                    }
                }
            }
            Trigger::ToolResult(pattern) => tool_result_matches(pattern, &context.tool_results),
            Trigger::Timeout(threshold_ms) => {
                let elapsed = (context.now - self.entered_at).num_milliseconds().max(0);
                elapsed as u64 >= *threshold_ms
            }
        }
    }
}

/// Case-insensitive substring match of any `|`-separated keyword.
fn intent_matches(keywords: &str, text: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .split('|')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .any(|k| text.contains(&k.to_lowercase()))
}

/// `toolName:outcome` where outcome is `success`, `error`, or a substring of
/// the tool output.
fn tool_result_matches(pattern: &str, results: &[ToolResultView]) -> bool {
    let Some((name, outcome)) = pattern.split_once(':') else {
        return false;
    };
    let (name, outcome) = (name.trim(), outcome.trim());
    results
        .iter()
        .filter(|r| r.name == name)
        .any(|r| match outcome {
            "success" => r.success,
            "error" => !r.success,
            literal => r.output.contains(literal),
        })
}
