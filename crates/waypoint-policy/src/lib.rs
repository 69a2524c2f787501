//! # waypoint-policy
//!
//! The deny-by-default tool gate for the Waypoint runtime, plus the TOML
//! loader for engine settings.
//!
//! ## Overview
//!
//! [`PolicyGate`] implements the [`ToolGate`](waypoint_core::traits::ToolGate)
//! trait. The runtime consults it before executing any tool call the model
//! proposes; it never assumes the backend honored the tool list it was
//! given.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use waypoint_policy::{settings::load_engine_config_file, PolicyGate};
//!
//! let config = load_engine_config_file(Path::new("engine.toml"))?;
//! let gate = PolicyGate::new(Arc::clone(&spec));
//! // Pass both to `waypoint_core::Runtime::new(...)`.
//! ```

pub mod gate;
pub mod settings;

pub use gate::PolicyGate;
pub use settings::{load_engine_config_file, load_engine_config_str};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;

    use waypoint_contracts::{
        config::EngineConfig,
        error::EngineError,
        internal::INTERNAL_TOOL_NAMES,
        message::ToolCall,
        spec::{AgentIdentity, GlobalPolicy, Specification, StateSpec, ToolDefinition, ToolTransport},
    };
    use waypoint_core::traits::ToolGate;

    use crate::{load_engine_config_str, PolicyGate};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn tool() -> ToolDefinition {
        ToolDefinition {
            description: "test tool".to_string(),
            parameters: json!({ "type": "object" }),
            transport: ToolTransport::Mcp {
                server: "clinic".to_string(),
                tool: None,
            },
        }
    }

    fn state(id: &str, tools: &[&str]) -> StateSpec {
        StateSpec {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            prompt: vec![],
            allowed_tools: tools.iter().map(|t| t.to_string()).collect(),
            transitions: vec![],
            terminal: false,
            max_iterations: None,
        }
    }

    fn spec() -> Arc<Specification> {
        let mut tools = BTreeMap::new();
        for name in ["symptoms.analyze", "clinic.lookup", "appointments.book", "billing.charge"] {
            tools.insert(name.to_string(), tool());
        }
        Arc::new(Specification {
            agent: AgentIdentity {
                id: "triage".to_string(),
                name: "Triage".to_string(),
                ..Default::default()
            },
            policy: GlobalPolicy::default(),
            initial_state: "welcome".to_string(),
            fallback_state: None,
            global_allowed_tools: vec!["clinic.lookup".to_string()],
            tools,
            tool_order: None,
            states: vec![
                state("welcome", &[]),
                state("triage", &["symptoms.analyze"]),
                state("booking", &["appointments.book"]),
            ],
        })
    }

    fn calls(names: &[&str]) -> Vec<ToolCall> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ToolCall::new(format!("call-{i}"), *n, json!({})))
            .collect()
    }

    // ── 1. validate ───────────────────────────────────────────────────────────

    #[test]
    fn state_tools_are_allowed() {
        let gate = PolicyGate::new(spec());
        let verdict = gate.validate("triage", &calls(&["symptoms.analyze"])).unwrap();
        assert!(verdict.allowed);
        assert!(verdict.blocked.is_empty());
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn global_and_internal_tools_are_allowed_everywhere() {
        let gate = PolicyGate::new(spec());
        let mut names = vec!["clinic.lookup"];
        names.extend(INTERNAL_TOOL_NAMES);
        let verdict = gate.validate("welcome", &calls(&names)).unwrap();
        assert!(verdict.allowed, "blocked: {:?}", verdict.blocked);
    }

    #[test]
    fn tools_of_other_states_are_blocked() {
        let gate = PolicyGate::new(spec());
        let verdict = gate
            .validate("triage", &calls(&["symptoms.analyze", "appointments.book"]))
            .unwrap();
        assert!(!verdict.allowed);
        assert_eq!(verdict.blocked, vec!["appointments.book"]);
        assert!(verdict.reason.unwrap().contains("'appointments.book'"));
    }

    #[test]
    fn blocked_names_reported_once_in_call_order() {
        let gate = PolicyGate::new(spec());
        let verdict = gate
            .validate(
                "welcome",
                &calls(&["shell.exec", "billing.charge", "shell.exec", "kb.search"]),
            )
            .unwrap();
        assert_eq!(verdict.blocked, vec!["shell.exec", "billing.charge"]);
    }

    #[test]
    fn empty_batch_is_allowed() {
        let gate = PolicyGate::new(spec());
        assert!(gate.validate("welcome", &[]).unwrap().allowed);
    }

    #[test]
    fn unknown_state_is_an_error() {
        let gate = PolicyGate::new(spec());
        assert_eq!(
            gate.validate("nowhere", &calls(&["kb.search"])),
            Err(EngineError::unknown_state("nowhere"))
        );
    }

    // ── 2. allow-list closure ─────────────────────────────────────────────────

    #[test]
    fn gate_agrees_with_effective_allow_list() {
        let spec = spec();
        let gate = PolicyGate::new(Arc::clone(&spec));
        let mut universe: Vec<String> = spec.tools.keys().cloned().collect();
        universe.extend(INTERNAL_TOOL_NAMES.iter().map(|s| s.to_string()));
        universe.push("unregistered.tool".to_string());

        for state in &spec.states {
            let allowed = spec.effective_allowed_tools(&state.id).unwrap();
            for name in &universe {
                let verdict = gate.validate(&state.id, &calls(&[name.as_str()])).unwrap();
                assert_eq!(
                    verdict.allowed,
                    allowed.contains(name),
                    "state '{}' tool '{}'",
                    state.id,
                    name
                );
            }
        }
    }

    // ── 3. filter ─────────────────────────────────────────────────────────────

    #[test]
    fn filter_partitions_without_failing() {
        let gate = PolicyGate::new(spec());
        let filtered = gate
            .filter("booking", &calls(&["appointments.book", "billing.charge", "notes.write"]))
            .unwrap();
        let allowed: Vec<&str> = filtered.allowed.iter().map(|c| c.name.as_str()).collect();
        let blocked: Vec<&str> = filtered.blocked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(allowed, vec!["appointments.book", "notes.write"]);
        assert_eq!(blocked, vec!["billing.charge"]);
    }

    // ── 4. constraint message ─────────────────────────────────────────────────

    #[test]
    fn constraint_message_names_blocked_and_allowed_tools() {
        let gate = PolicyGate::new(spec());
        let message = gate
            .constraint_message("triage", &["billing.charge".to_string()])
            .unwrap();
        assert!(message.contains("'billing.charge'"));
        assert!(message.contains("'TRIAGE'"));
        for name in ["symptoms.analyze", "clinic.lookup", "kb.search", "notes.write"] {
            assert!(message.contains(&format!("'{name}'")), "missing {name}: {message}");
        }
    }

    #[test]
    fn constraint_message_is_deterministic() {
        let gate = PolicyGate::new(spec());
        let blocked = vec!["x".to_string()];
        assert_eq!(
            gate.generate_constraint_message("booking", &blocked).unwrap(),
            gate.generate_constraint_message("booking", &blocked).unwrap()
        );
    }

    // ── 5. settings ───────────────────────────────────────────────────────────

    #[test]
    fn empty_settings_yield_defaults() {
        assert_eq!(load_engine_config_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_settings_override_defaults() {
        let config = load_engine_config_str(
            r#"
max_iterations_per_state = 4
enable_policy_gate = false
call_timeout_ms = 30000

[cost_per_token]
prompt = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.max_iterations_per_state, 4);
        assert!(!config.enable_policy_gate);
        assert_eq!(config.call_timeout_ms, Some(30_000));
        assert_eq!(config.cost_per_token.prompt, 0.5);
        assert_eq!(config.cost_per_token.completion, 0.0);
        assert_eq!(config.max_total_iterations, 50);
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        for doc in ["max_total_iterations = \"many\"", "this is not toml", "max_total_iterations = 0"] {
            assert!(
                matches!(load_engine_config_str(doc), Err(EngineError::ConfigError { .. })),
                "accepted: {doc}"
            );
        }
    }
}
