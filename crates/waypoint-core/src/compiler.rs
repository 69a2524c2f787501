//! The prompt compiler.
//!
//! `compile` is a pure function of (specification, state, options): no I/O,
//! no clocks, no randomness, and only ordered collections are traversed.
//! Identical inputs produce byte-identical prompts, which is what makes agent
//! behavior reproducible under evaluation.
//!
//! Section order is fixed:
//!
//!   identity → policy → state → transitions → tools → retrieval hints

use serde::{Deserialize, Serialize};
use tracing::debug;

use waypoint_contracts::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    internal::{internal_tool_definition, is_internal_tool, INTERNAL_TOOL_NAMES},
    spec::{FragmentRole, Specification, StateSpec},
};

/// Truncation marker appended to shortened tool descriptions.
pub const ELLIPSIS: char = '…';

/// A retrieved document the model may open by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHint {
    pub id: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Render `examples` prompt fragments.
    pub include_examples: bool,
    pub retrieval_hints: Vec<RetrievalHint>,
    pub tool_description_max_len: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_examples: true,
            retrieval_hints: Vec::new(),
            tool_description_max_len: 500,
        }
    }
}

impl CompileOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            include_examples: config.include_examples,
            retrieval_hints: Vec::new(),
            tool_description_max_len: config.tool_description_max_len,
        }
    }
}

/// A tool as offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The tool-choice policy sent to the backend. A specific tool is never
/// forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    None,
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPrompt {
    pub system: String,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    /// Identifiers only, most relevant first.
    pub retrieval_hints: Vec<String>,
}

/// Compile the prompt for `state_id`.
///
/// # Errors
///
/// `UnknownState` if `state_id` is not in the specification;
/// `InvalidSpecification` if an allowed tool has no registry entry.
pub fn compile(
    spec: &Specification,
    state_id: &str,
    options: &CompileOptions,
) -> EngineResult<CompiledPrompt> {
    let state = spec.require_state(state_id)?;
    let declared = spec.declared_tools(state_id)?;

    let tools = ordered_tools(spec, &declared, options.tool_description_max_len)?;
    let tool_choice = if declared.is_empty() {
        ToolChoice::None
    } else {
        ToolChoice::Auto
    };

    let mut hints: Vec<&RetrievalHint> = options.retrieval_hints.iter().collect();
    hints.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then_with(|| a.id.cmp(&b.id)));
    let retrieval_hints: Vec<String> = hints.into_iter().map(|h| h.id.clone()).collect();

    let sections = [
        render_identity(spec),
        render_policy(spec),
        render_state(state, options.include_examples),
        render_transitions(state),
        render_tools(&tools),
        render_hints(&retrieval_hints),
    ];
    let system = sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    debug!(
        state = %state_id,
        tools = tools.len(),
        tool_choice = ?tool_choice,
        prompt_chars = system.len(),
        "compiled prompt"
    );

    Ok(CompiledPrompt {
        system,
        tools,
        tool_choice,
        retrieval_hints,
    })
}

/// Declared tools in `tool_order` order, then alphabetically, then the
/// internal tools in their fixed order.
fn ordered_tools(
    spec: &Specification,
    declared: &std::collections::BTreeSet<String>,
    max_len: usize,
) -> EngineResult<Vec<ToolSpec>> {
    let external: Vec<&String> = declared.iter().filter(|n| !is_internal_tool(n)).collect();

    let mut names: Vec<&str> = Vec::with_capacity(external.len() + INTERNAL_TOOL_NAMES.len());
    if let Some(order) = &spec.tool_order {
        for name in order {
            if external.iter().any(|n| *n == name) && !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    for name in &external {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }

    let mut tools = Vec::with_capacity(names.len() + INTERNAL_TOOL_NAMES.len());
    for name in names {
        let definition = spec
            .tools
            .get(name)
            .ok_or_else(|| EngineError::InvalidSpecification {
                reason: format!("allowed tool '{name}' is not in the tool registry"),
            })?;
        tools.push(ToolSpec {
            name: name.to_string(),
            description: truncate_description(&definition.description, max_len),
            parameters: definition.parameters.clone(),
        });
    }
    for name in INTERNAL_TOOL_NAMES {
        if let Some(definition) = internal_tool_definition(name) {
            tools.push(ToolSpec {
                name: name.to_string(),
                description: truncate_description(&definition.description, max_len),
                parameters: definition.parameters,
            });
        }
    }
    Ok(tools)
}

/// Shorten `text` to at most `max_len` characters, ending on a word
/// boundary followed by `…`. Text within the limit is returned unchanged.
pub fn truncate_description(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len == 0 {
        return String::new();
    }

    let budget = max_len - 1;
    let head: String = text.chars().take(budget).collect();
    let cuts_word = text
        .chars()
        .nth(budget)
        .is_some_and(|c| !c.is_whitespace());

    let kept = if cuts_word {
        match head.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => &head[..idx],
            _ => head.as_str(),
        }
    } else {
        head.as_str()
    };

    format!("{}{ELLIPSIS}", kept.trim_end())
}

fn render_identity(spec: &Specification) -> String {
    let agent = &spec.agent;
    let mut lines = vec![format!("# Agent: {}", agent.name)];
    for (label, value) in [
        ("Domain", &agent.domain),
        ("Purpose", &agent.purpose),
        ("Scope", &agent.scope),
        ("Problem statement", &agent.problem_statement),
    ] {
        if !value.trim().is_empty() {
            lines.push(format!("{label}: {}", value.trim()));
        }
    }
    lines.join("\n")
}

fn render_policy(spec: &Specification) -> String {
    let policy = &spec.policy;
    let mut lines = vec![
        "# Policy".to_string(),
        format!("- Risk level: {}", policy.risk_level),
        format!("- Data classification: {}", policy.data_classification),
        format!("- PII handling: {}", policy.pii_handling),
    ];
    lines.extend(policy.rules.iter().map(|rule| format!("- {}", rule.trim())));
    lines.join("\n")
}

fn render_state(state: &StateSpec, include_examples: bool) -> String {
    let mut out = vec![format!("# Current state: {} ({})", state.name, state.id)];
    if !state.description.trim().is_empty() {
        out.push(state.description.trim().to_string());
    }

    for role in FragmentRole::ORDER {
        if role == FragmentRole::Examples && !include_examples {
            continue;
        }
        let mut fragments: Vec<_> = state.prompt.iter().filter(|f| f.role == role).collect();
        if fragments.is_empty() {
            continue;
        }
        fragments.sort_by(|a, b| b.priority.cmp(&a.priority));
        out.push(format!("## {}", role.heading()));
        out.extend(fragments.into_iter().map(|f| f.content.trim().to_string()));
    }

    out.join("\n")
}

fn render_transitions(state: &StateSpec) -> String {
    let mut lines = vec!["# Transitions".to_string()];
    let ordered = state.transitions_by_priority();
    if ordered.is_empty() {
        lines.push(if state.terminal {
            "- none (final state)".to_string()
        } else {
            "- none".to_string()
        });
    }
    lines.extend(
        ordered
            .into_iter()
            .map(|t| format!("- on {} -> {}", t.trigger, t.target)),
    );
    lines.join("\n")
}

fn render_tools(tools: &[ToolSpec]) -> String {
    let mut blocks = vec!["# Tools".to_string()];
    for tool in tools {
        blocks.push(format!(
            "## {}\n{}\nParameters: {}",
            tool.name, tool.description, tool.parameters
        ));
    }
    blocks.join("\n")
}

fn render_hints(hints: &[String]) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let mut lines = vec!["# Retrieval hints".to_string()];
    lines.extend(hints.iter().map(|id| format!("- {id}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use waypoint_contracts::spec::{
        AgentIdentity, GlobalPolicy, PromptFragment, RiskLevel, ToolDefinition, ToolTransport,
        Transition, Trigger,
    };

    use super::*;

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn fragment(role: FragmentRole, content: &str, priority: i32) -> PromptFragment {
        PromptFragment {
            role,
            content: content.to_string(),
            priority,
        }
    }

    fn tool(description: &str) -> ToolDefinition {
        ToolDefinition {
            description: description.to_string(),
            parameters: json!({ "type": "object", "properties": { "text": { "type": "string" } } }),
            transport: ToolTransport::Http {
                url: "http://tools.local".to_string(),
                method: "POST".to_string(),
            },
        }
    }

    fn spec() -> Specification {
        let mut tools = BTreeMap::new();
        tools.insert("symptoms.analyze".to_string(), tool("Analyze reported symptoms."));
        tools.insert("clinic.lookup".to_string(), tool("Find the nearest clinic."));
        tools.insert("appointments.book".to_string(), tool("Book an appointment."));

        Specification {
            agent: AgentIdentity {
                id: "triage".to_string(),
                name: "Nurse Line".to_string(),
                domain: "healthcare".to_string(),
                purpose: "Route callers to the right care".to_string(),
                scope: String::new(),
                problem_statement: String::new(),
            },
            policy: GlobalPolicy {
                risk_level: RiskLevel::High,
                rules: vec!["Never diagnose.".to_string()],
                ..Default::default()
            },
            initial_state: "welcome".to_string(),
            fallback_state: None,
            global_allowed_tools: vec![],
            tools,
            tool_order: None,
            states: vec![
                StateSpec {
                    id: "welcome".to_string(),
                    name: "Welcome".to_string(),
                    description: "Greet the caller.".to_string(),
                    prompt: vec![
                        fragment(FragmentRole::Instructions, "Ask what is wrong.", 1),
                        fragment(FragmentRole::Examples, "User: I feel sick", 0),
                        fragment(FragmentRole::Instructions, "Be brief.", 5),
                        fragment(FragmentRole::IdentityContext, "You answer a nurse line.", 0),
                    ],
                    allowed_tools: vec![],
                    transitions: vec![
                        Transition {
                            trigger: Trigger::Intent("headache|pain".to_string()),
                            target: "triage".to_string(),
                            priority: 1,
                        },
                        Transition {
                            trigger: Trigger::Timeout(60_000),
                            target: "triage".to_string(),
                            priority: 5,
                        },
                    ],
                    terminal: false,
                    max_iterations: None,
                },
                StateSpec {
                    id: "triage".to_string(),
                    name: "Triage".to_string(),
                    description: String::new(),
                    prompt: vec![],
                    allowed_tools: vec![
                        "symptoms.analyze".to_string(),
                        "clinic.lookup".to_string(),
                        "appointments.book".to_string(),
                    ],
                    transitions: vec![],
                    terminal: true,
                    max_iterations: None,
                },
            ],
        }
    }

    fn tool_names(prompt: &CompiledPrompt) -> Vec<&str> {
        prompt.tools.iter().map(|t| t.name.as_str()).collect()
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn compile_is_deterministic() {
        let spec = spec();
        let options = CompileOptions {
            retrieval_hints: vec![
                RetrievalHint { id: "doc-b".to_string(), relevance: 0.4 },
                RetrievalHint { id: "doc-a".to_string(), relevance: 0.9 },
            ],
            ..Default::default()
        };
        let first = compile(&spec, "triage", &options).unwrap();
        let second = compile(&spec, "triage", &options).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.system.as_bytes(), second.system.as_bytes());
    }

    #[test]
    fn unknown_state_fails() {
        assert_eq!(
            compile(&spec(), "nowhere", &CompileOptions::default()),
            Err(EngineError::unknown_state("nowhere"))
        );
    }

    #[test]
    fn sections_render_in_fixed_order() {
        let options = CompileOptions {
            retrieval_hints: vec![RetrievalHint { id: "doc-1".to_string(), relevance: 1.0 }],
            ..Default::default()
        };
        let prompt = compile(&spec(), "welcome", &options).unwrap();
        let positions: Vec<usize> = [
            "# Agent: Nurse Line",
            "# Policy",
            "# Current state: Welcome (welcome)",
            "# Transitions",
            "# Tools",
            "# Retrieval hints",
        ]
        .iter()
        .map(|heading| prompt.system.find(heading).unwrap_or_else(|| panic!("missing {heading}")))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "sections out of order");
        assert!(prompt.system.contains("- Risk level: high"));
        assert!(prompt.system.contains("- Never diagnose."));
        assert!(!prompt.system.contains("Scope:"), "empty identity fields are omitted");
    }

    #[test]
    fn fragments_group_by_role_and_sort_by_priority() {
        let prompt = compile(&spec(), "welcome", &CompileOptions::default()).unwrap();
        let s = &prompt.system;
        let context = s.find("## Context").unwrap();
        let instructions = s.find("## Instructions").unwrap();
        let examples = s.find("## Examples").unwrap();
        assert!(context < instructions && instructions < examples);
        assert!(s.find("Be brief.").unwrap() < s.find("Ask what is wrong.").unwrap());
    }

    #[test]
    fn examples_can_be_disabled() {
        let options = CompileOptions {
            include_examples: false,
            ..Default::default()
        };
        let prompt = compile(&spec(), "welcome", &options).unwrap();
        assert!(!prompt.system.contains("## Examples"));
        assert!(!prompt.system.contains("I feel sick"));
    }

    #[test]
    fn transition_summary_follows_evaluation_order() {
        let prompt = compile(&spec(), "welcome", &CompileOptions::default()).unwrap();
        let timeout = prompt.system.find("- on timeout after 60000ms -> triage").unwrap();
        let intent = prompt.system.find("- on intent \"headache|pain\" -> triage").unwrap();
        assert!(timeout < intent);
    }

    #[test]
    fn empty_declared_tools_disable_tool_choice() {
        let prompt = compile(&spec(), "welcome", &CompileOptions::default()).unwrap();
        assert_eq!(prompt.tool_choice, ToolChoice::None);
        assert_eq!(tool_names(&prompt), INTERNAL_TOOL_NAMES.to_vec());
    }

    #[test]
    fn tools_sort_alphabetically_then_internal() {
        let prompt = compile(&spec(), "triage", &CompileOptions::default()).unwrap();
        assert_eq!(prompt.tool_choice, ToolChoice::Auto);
        assert_eq!(
            tool_names(&prompt),
            vec![
                "appointments.book",
                "clinic.lookup",
                "symptoms.analyze",
                "kb.search",
                "kb.open",
                "notes.read",
                "notes.write"
            ]
        );
    }

    #[test]
    fn explicit_tool_order_wins() {
        let mut spec = spec();
        spec.tool_order = Some(vec![
            "symptoms.analyze".to_string(),
            "not.allowed.here".to_string(),
            "clinic.lookup".to_string(),
        ]);
        let prompt = compile(&spec, "triage", &CompileOptions::default()).unwrap();
        assert_eq!(
            &tool_names(&prompt)[..3],
            &["symptoms.analyze", "clinic.lookup", "appointments.book"]
        );
    }

    #[test]
    fn global_tools_join_state_tools() {
        let mut spec = spec();
        spec.global_allowed_tools = vec!["clinic.lookup".to_string()];
        let prompt = compile(&spec, "welcome", &CompileOptions::default()).unwrap();
        assert_eq!(prompt.tool_choice, ToolChoice::Auto);
        assert_eq!(tool_names(&prompt)[0], "clinic.lookup");
    }

    #[test]
    fn retrieval_hints_sorted_by_relevance_as_identifiers() {
        let options = CompileOptions {
            retrieval_hints: vec![
                RetrievalHint { id: "doc-low".to_string(), relevance: 0.1 },
                RetrievalHint { id: "doc-high".to_string(), relevance: 0.8 },
                RetrievalHint { id: "doc-mid".to_string(), relevance: 0.5 },
            ],
            ..Default::default()
        };
        let prompt = compile(&spec(), "welcome", &options).unwrap();
        assert_eq!(prompt.retrieval_hints, vec!["doc-high", "doc-mid", "doc-low"]);
        assert!(prompt.system.ends_with("# Retrieval hints\n- doc-high\n- doc-mid\n- doc-low"));
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let mut spec = spec();
        let long = "word ".repeat(200);
        spec.tools.get_mut("symptoms.analyze").unwrap().description = long;
        let options = CompileOptions {
            tool_description_max_len: 40,
            ..Default::default()
        };
        let prompt = compile(&spec, "triage", &options).unwrap();
        let analyze = prompt.tools.iter().find(|t| t.name == "symptoms.analyze").unwrap();
        assert!(analyze.description.chars().count() <= 40);
        assert!(analyze.description.ends_with(ELLIPSIS));
    }

    #[test]
    fn truncation_ends_on_word_boundary() {
        assert_eq!(truncate_description("short", 10), "short");
        assert_eq!(truncate_description("alpha beta gamma", 12), "alpha beta…");
        assert_eq!(truncate_description("alpha beta gamma", 11), "alpha beta…");
        assert_eq!(truncate_description("abcdefghij", 5), "abcd…");
        assert_eq!(truncate_description("héllo wörld", 8), "héllo…");
    }

    #[test]
    fn missing_registry_entry_fails_loudly() {
        let mut spec = spec();
        spec.tools.remove("clinic.lookup");
        assert!(matches!(
            compile(&spec, "triage", &CompileOptions::default()),
            Err(EngineError::InvalidSpecification { .. })
        ));
    }
}
