//! Schema-based tool argument verifier.
//!
//! `SchemaArgumentVerifier` implements the `ArgumentVerifier` trait from
//! waypoint-core. Arguments the model proposes are validated against the
//! tool's `parameters` JSON Schema with the `jsonschema` crate before the
//! tool runs. All violations are collected so the model sees the full set
//! in one corrective tool result.

use serde_json::Value;
use tracing::warn;

use waypoint_contracts::{
    spec::ToolDefinition,
    verify::{VerificationFailure, VerificationReport},
};
use waypoint_core::traits::ArgumentVerifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaArgumentVerifier;

impl SchemaArgumentVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl ArgumentVerifier for SchemaArgumentVerifier {
    fn verify(&self, tool_name: &str, definition: &ToolDefinition, arguments: &Value) -> VerificationReport {
        // A null schema means "no constraint".
        if definition.parameters.is_null() {
            return VerificationReport::pass();
        }

        let mut failures = Vec::new();
        match jsonschema::validator_for(&definition.parameters) {
            Ok(validator) => {
                for error in validator.iter_errors(arguments) {
                    let path = error.instance_path.to_string();
                    let location = if path.is_empty() { "/".to_string() } else { path };
                    let message = format!("argument violation at {}: {}", location, error);
                    warn!(tool = %tool_name, %message, "tool argument validation failure");
                    failures.push(VerificationFailure::new("json-schema", message));
                }
            }
            Err(e) => {
                let message = format!("invalid parameter schema: {e}");
                warn!(tool = %tool_name, %message, "tool schema compilation failure");
                failures.push(VerificationFailure::new("json-schema", message));
            }
        }

        VerificationReport::from_failures(failures)
    }
}
