//! Structural validation of agent specifications.
//!
//! `SpecValidator` walks a parsed `Specification` and collects every problem
//! in one pass so authors see the full set at once. Issues are either errors
//! (the engine must not load the document) or warnings (suspicious but
//! runnable).
//!
//! Malformed `condition` triggers never match at runtime; by default the
//! validator reports them as warnings, and as errors when constructed with
//! `SpecValidator::strict()`.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use tracing::debug;

use waypoint_contracts::{
    internal::is_internal_tool,
    spec::{Specification, StateSpec, ToolTransport, Trigger},
};
use waypoint_core::condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Stable identifier of the check that fired (e.g. "unknown-target").
    pub rule_id: &'static str,
    /// Where in the document, e.g. `states.welcome.transitions[0]`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule_id, self.location, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Errors joined with `; `.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpecValidator {
    strict_conditions: bool,
}

impl SpecValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat unparseable `condition` triggers as errors.
    pub fn strict() -> Self {
        Self {
            strict_conditions: true,
        }
    }

    pub fn validate(&self, spec: &Specification) -> ValidationOutcome {
        let mut issues = Issues::default();

        self.check_identity(spec, &mut issues);
        self.check_states(spec, &mut issues);
        self.check_tools(spec, &mut issues);
        for state in &spec.states {
            self.check_state(spec, state, &mut issues);
        }
        self.check_reachability(spec, &mut issues);

        debug!(
            agent = %spec.agent.id,
            errors = issues.0.iter().filter(|i| i.severity == Severity::Error).count(),
            warnings = issues.0.iter().filter(|i| i.severity == Severity::Warning).count(),
            "specification validated"
        );
        ValidationOutcome { issues: issues.0 }
    }

    fn check_identity(&self, spec: &Specification, issues: &mut Issues) {
        if spec.agent.id.trim().is_empty() {
            issues.error("missing-field", "agent.id", "agent id must not be empty");
        }
        if spec.agent.name.trim().is_empty() {
            issues.error("missing-field", "agent.name", "agent name must not be empty");
        }
    }

    fn check_states(&self, spec: &Specification, issues: &mut Issues) {
        if spec.states.is_empty() {
            issues.error("no-states", "states", "at least one state is required");
            return;
        }

        let mut seen = HashSet::new();
        for state in &spec.states {
            if !seen.insert(state.id.as_str()) {
                issues.error(
                    "duplicate-state",
                    format!("states.{}", state.id),
                    format!("state id '{}' is declared more than once", state.id),
                );
            }
        }

        if spec.state(&spec.initial_state).is_none() {
            issues.error(
                "unknown-state",
                "initial_state",
                format!("initial state '{}' does not exist", spec.initial_state),
            );
        }
        if let Some(fallback) = &spec.fallback_state {
            if spec.state(fallback).is_none() {
                issues.error(
                    "unknown-state",
                    "fallback_state",
                    format!("fallback state '{fallback}' does not exist"),
                );
            }
        }
        if !spec.states.iter().any(|s| s.terminal) {
            issues.warning(
                "no-terminal-state",
                "states",
                "no state is terminal; turns only end on a natural stop",
            );
        }
    }

    fn check_tools(&self, spec: &Specification, issues: &mut Issues) {
        for (name, tool) in &spec.tools {
            let location = format!("tools.{name}");
            if is_internal_tool(name) {
                issues.error(
                    "reserved-tool",
                    &location,
                    format!("'{name}' is a reserved internal tool and cannot be redefined"),
                );
            }
            match &tool.transport {
                ToolTransport::Internal => issues.error(
                    "internal-transport",
                    &location,
                    "only the reserved internal tools may use the internal transport",
                ),
                ToolTransport::Http { url, .. } if url.trim().is_empty() => {
                    issues.error("missing-field", &location, "http transport requires a url")
                }
                ToolTransport::Mcp { server, .. } if server.trim().is_empty() => {
                    issues.error("missing-field", &location, "mcp transport requires a server")
                }
                _ => {}
            }
            if let Err(e) = jsonschema::validator_for(&tool.parameters) {
                issues.error(
                    "invalid-parameters",
                    &location,
                    format!("parameters are not a valid JSON Schema: {e}"),
                );
            }
        }

        for name in &spec.global_allowed_tools {
            if !spec.tools.contains_key(name) && !is_internal_tool(name) {
                issues.error(
                    "unregistered-tool",
                    "global_allowed_tools",
                    format!("tool '{name}' is not in the tool registry"),
                );
            }
        }

        if let Some(order) = &spec.tool_order {
            let mut seen = HashSet::new();
            for name in order {
                if !seen.insert(name.as_str()) {
                    issues.warning("tool-order", "tool_order", format!("'{name}' is listed more than once"));
                } else if !spec.tools.contains_key(name) {
                    issues.warning("tool-order", "tool_order", format!("'{name}' is not in the tool registry"));
                }
            }
        }
    }

    fn check_state(&self, spec: &Specification, state: &StateSpec, issues: &mut Issues) {
        let base = format!("states.{}", state.id);

        if state.max_iterations == Some(0) {
            issues.error("iteration-limit", &base, "max_iterations must be at least 1");
        }

        for name in &state.allowed_tools {
            if !spec.tools.contains_key(name) && !is_internal_tool(name) {
                issues.error(
                    "unregistered-tool",
                    format!("{base}.allowed_tools"),
                    format!("tool '{name}' is not in the tool registry"),
                );
            }
        }

        let allowed: BTreeSet<&str> = spec
            .global_allowed_tools
            .iter()
            .chain(state.allowed_tools.iter())
            .map(String::as_str)
            .collect();

        for (index, transition) in state.transitions.iter().enumerate() {
            let location = format!("{base}.transitions[{index}]");

            if spec.state(&transition.target).is_none() {
                issues.error(
                    "unknown-target",
                    &location,
                    format!("target state '{}' does not exist", transition.target),
                );
            }

            match &transition.trigger {
                Trigger::Intent(keywords) => {
                    if keywords.split('|').all(|k| k.trim().is_empty()) {
                        issues.error("empty-intent", &location, "intent trigger has no keywords");
                    }
                }
                Trigger::Condition(expression) => {
                    if let Err(e) = condition::parse(expression) {
                        let message = format!("condition '{expression}' never matches: {e}");
                        if self.strict_conditions {
                            issues.error("malformed-condition", &location, message);
                        } else {
                            issues.warning("malformed-condition", &location, message);
                        }
                    }
                }
                Trigger::ToolResult(pattern) => match pattern.split_once(':') {
                    None => issues.error(
                        "tool-result-format",
                        &location,
                        format!("'{pattern}' must have the form 'toolName:outcome'"),
                    ),
                    Some((tool, outcome)) => {
                        let tool = tool.trim();
                        if tool.is_empty() || outcome.trim().is_empty() {
                            issues.error(
                                "tool-result-format",
                                &location,
                                format!("'{pattern}' must name both a tool and an outcome"),
                            );
                        } else if !allowed.contains(tool) && !is_internal_tool(tool) {
                            issues.warning(
                                "tool-result-unreachable",
                                &location,
                                format!("tool '{tool}' is not allowed in this state, so this trigger cannot fire"),
                            );
                        }
                    }
                },
                Trigger::Timeout(_) => {}
            }
        }
    }

    fn check_reachability(&self, spec: &Specification, issues: &mut Issues) {
        let mut reachable: HashSet<&str> = HashSet::new();
        reachable.insert(spec.initial_state.as_str());
        if let Some(fallback) = &spec.fallback_state {
            reachable.insert(fallback.as_str());
        }
        for state in &spec.states {
            for transition in &state.transitions {
                reachable.insert(transition.target.as_str());
            }
        }
        for state in &spec.states {
            if !reachable.contains(state.id.as_str()) {
                issues.warning(
                    "unreachable-state",
                    format!("states.{}", state.id),
                    "no transition leads to this state",
                );
            }
        }
    }
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, severity: Severity, rule_id: &'static str, location: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            severity,
            rule_id,
            location: location.into(),
            message: message.into(),
        });
    }

    fn error(&mut self, rule_id: &'static str, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, rule_id, location, message);
    }

    fn warning(&mut self, rule_id: &'static str, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, rule_id, location, message);
    }
}
