//! The `condition` trigger micro-grammar.
//!
//! ```text
//! condition := variable op value
//! variable  := "iteration" | "tool_calls_count" | "metadata." path
//! op        := "==" | "!=" | ">=" | "<=" | ">" | "<" | "contains"
//! value     := bare text | "double quoted" | 'single quoted'
//! ```
//!
//! Evaluation never errors: an expression that does not parse, a variable
//! that does not resolve, or a numeric comparison over non-numeric input is
//! simply "no match".

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(==|!=|>=|<=|>|<|\bcontains\b)\s*(.+?)\s*$")
        .expect("condition pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "contains" => Operator::Contains,
            _ => return None,
        })
    }
}

/// Where a condition's left-hand side is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variable {
    Iteration,
    ToolCallsCount,
    /// Dotted path below `metadata.`.
    Metadata(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub variable: Variable,
    pub op: Operator,
    pub value: String,
}

/// Why an expression does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    Syntax,
    UnknownVariable(String),
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionError::Syntax => f.write_str("expected '<variable> <op> <value>'"),
            ConditionError::UnknownVariable(name) => write!(
                f,
                "unknown variable '{name}' (expected iteration, tool_calls_count or metadata.<path>)"
            ),
        }
    }
}

impl std::error::Error for ConditionError {}

/// Values a condition can read besides metadata.
#[derive(Debug, Clone, Copy)]
pub struct ConditionScope<'a> {
    pub metadata: &'a Map<String, Value>,
    pub iteration: u32,
    pub tool_calls_count: u32,
}

pub fn parse(expression: &str) -> Result<Condition, ConditionError> {
    let caps = CONDITION_RE
        .captures(expression)
        .ok_or(ConditionError::Syntax)?;
    let variable = parse_variable(&caps[1])?;
    let op = Operator::parse(&caps[2]).ok_or(ConditionError::Syntax)?;
    let value = unquote(&caps[3]).to_string();
    Ok(Condition { variable, op, value })
}

fn parse_variable(name: &str) -> Result<Variable, ConditionError> {
    match name {
        "iteration" => Ok(Variable::Iteration),
        "tool_calls_count" => Ok(Variable::ToolCallsCount),
        _ => match name.strip_prefix("metadata.") {
            Some(path) if !path.is_empty() && path.split('.').all(|s| !s.is_empty()) => {
                Ok(Variable::Metadata(path.split('.').map(str::to_string).collect()))
            }
            _ => Err(ConditionError::UnknownVariable(name.to_string())),
        },
    }
}

fn unquote(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if raw.len() >= 2 {
        let (first, last) = (bytes[0], bytes[raw.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

impl Condition {
    pub fn evaluate(&self, scope: &ConditionScope<'_>) -> bool {
        let Some(actual) = self.resolve(scope) else {
            return false;
        };

        match self.op {
            Operator::Eq => loosely_equal(&actual, &self.value),
            Operator::Ne => !loosely_equal(&actual, &self.value),
            Operator::Contains => contains(&actual, &self.value),
            Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
                let (Some(lhs), Some(rhs)) = (as_number(&actual), self.value.trim().parse::<f64>().ok())
                else {
                    return false;
                };
                match self.op {
                    Operator::Gt => lhs > rhs,
                    Operator::Lt => lhs < rhs,
                    Operator::Ge => lhs >= rhs,
                    _ => lhs <= rhs,
                }
            }
        }
    }

    fn resolve(&self, scope: &ConditionScope<'_>) -> Option<Value> {
        match &self.variable {
            Variable::Iteration => Some(Value::from(scope.iteration)),
            Variable::ToolCallsCount => Some(Value::from(scope.tool_calls_count)),
            Variable::Metadata(path) => {
                let (head, rest) = path.split_first()?;
                let mut current = scope.metadata.get(head)?;
                for segment in rest {
                    current = match current {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(current.clone())
            }
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &str) -> bool {
    if let (Some(lhs), Ok(rhs)) = (as_number(actual), expected.trim().parse::<f64>()) {
        return lhs == rhs;
    }
    as_text(actual) == expected
}

fn contains(actual: &Value, needle: &str) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        other => as_text(other).contains(needle),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Malformed expressions evaluate to `false`, as the state machine treats them.
    fn evaluate(expression: &str, scope: &ConditionScope<'_>) -> bool {
        parse(expression).is_ok_and(|c| c.evaluate(scope))
    }

    fn scope(metadata: &Map<String, Value>) -> ConditionScope<'_> {
        ConditionScope {
            metadata,
            iteration: 3,
            tool_calls_count: 2,
        }
    }

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_all_operators() {
        for (expr, op) in [
            ("iteration == 1", Operator::Eq),
            ("iteration != 1", Operator::Ne),
            ("iteration > 1", Operator::Gt),
            ("iteration < 1", Operator::Lt),
            ("iteration >= 1", Operator::Ge),
            ("iteration <= 1", Operator::Le),
            ("metadata.tags contains red", Operator::Contains),
        ] {
            assert_eq!(parse(expr).unwrap().op, op, "{expr}");
        }
    }

    #[test]
    fn counters_compare_numerically() {
        let m = Map::new();
        assert!(evaluate("iteration >= 3", &scope(&m)));
        assert!(evaluate("iteration>2", &scope(&m)));
        assert!(!evaluate("iteration < 3", &scope(&m)));
        assert!(evaluate("tool_calls_count == 2", &scope(&m)));
        assert!(evaluate("tool_calls_count == 2.0", &scope(&m)));
    }

    #[test]
    fn metadata_paths_resolve_nested_values() {
        let m = meta(json!({ "patient": { "age": 71, "tags": ["cardiac", "fall"] }, "severity": "high" }));
        assert!(evaluate("metadata.patient.age > 65", &scope(&m)));
        assert!(evaluate("metadata.severity == high", &scope(&m)));
        assert!(evaluate("metadata.severity == \"high\"", &scope(&m)));
        assert!(evaluate("metadata.patient.tags contains fall", &scope(&m)));
        assert!(evaluate("metadata.patient.tags.0 == cardiac", &scope(&m)));
        assert!(!evaluate("metadata.patient.weight > 1", &scope(&m)));
    }

    #[test]
    fn quoted_values_keep_inner_spaces() {
        let m = meta(json!({ "summary": "chest pain at rest" }));
        assert!(evaluate("metadata.summary contains 'pain at'", &scope(&m)));
    }

    #[test]
    fn numeric_operators_fail_soft_on_text() {
        let m = meta(json!({ "severity": "high" }));
        assert!(!evaluate("metadata.severity > 2", &scope(&m)));
        assert!(!evaluate("iteration > many", &scope(&m)));
    }

    #[test]
    fn malformed_expressions_never_match() {
        let m = Map::new();
        assert!(!evaluate("", &scope(&m)));
        assert!(!evaluate("iteration", &scope(&m)));
        assert!(!evaluate("iteration ~= 3", &scope(&m)));
        assert_eq!(parse("turns > 3"), Err(ConditionError::UnknownVariable("turns".to_string())));
        assert_eq!(parse("metadata. == x"), Err(ConditionError::UnknownVariable("metadata.".to_string())));
    }

    #[test]
    fn not_equal_on_missing_variable_is_no_match() {
        let m = Map::new();
        assert!(!evaluate("metadata.absent != x", &scope(&m)));
    }
}
