//! Mock external tools for the triage agent.
//!
//! `ClinicTools` implements `ToolExecutor` for the two registered tools,
//! answering from `mock_data` instead of the HTTP and MCP services the
//! specification names. Every call is recorded so scenarios can show what
//! actually reached a tool.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use waypoint_contracts::{error::EngineResult, message::ToolOutcome, spec::ToolDefinition};
use waypoint_core::traits::ToolExecutor;

use crate::mock_data::{assess_symptoms, find_clinic};

pub const SYMPTOMS_ANALYZE: &str = "symptoms.analyze";
pub const CLINIC_LOOKUP: &str = "clinic.lookup";

#[derive(Debug, Default)]
pub struct ClinicTools {
    calls: Mutex<Vec<String>>,
}

impl ClinicTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tools executed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn analyze(arguments: &Value) -> ToolOutcome {
        let Some(text) = arguments.get("text").and_then(Value::as_str) else {
            return ToolOutcome::failed("missing required argument 'text'");
        };
        let assessment = assess_symptoms(text);

        // The severity band drives `condition` triggers on `metadata.severity`.
        let mut metadata = Map::new();
        metadata.insert("severity".to_string(), assessment["severity"].clone());
        ToolOutcome::ok(assessment).with_metadata(metadata)
    }

    fn lookup(arguments: &Value) -> ToolOutcome {
        let Some(postcode) = arguments.get("postcode").and_then(Value::as_str) else {
            return ToolOutcome::failed("missing required argument 'postcode'");
        };
        match find_clinic(postcode) {
            Some(clinic) => ToolOutcome::ok(clinic),
            None => ToolOutcome::failed(format!("no clinic serves postcode {postcode}")),
        }
    }
}

#[async_trait]
impl ToolExecutor for ClinicTools {
    async fn execute(&self, name: &str, _definition: &ToolDefinition, arguments: &Value) -> EngineResult<ToolOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());

        let outcome = match name {
            SYMPTOMS_ANALYZE => Self::analyze(arguments),
            CLINIC_LOOKUP => Self::lookup(arguments),
            other => ToolOutcome::failed(format!("no mock service for tool '{other}'")),
        };
        debug!(tool = %name, success = outcome.success, "mock tool executed");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use waypoint_contracts::spec::ToolTransport;

    use super::*;

    fn definition() -> ToolDefinition {
        ToolDefinition {
            description: "mock".to_string(),
            parameters: json!({ "type": "object" }),
            transport: ToolTransport::Http {
                url: "https://tools.triage.example".to_string(),
                method: "POST".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn analyze_reports_severity_as_metadata() {
        let tools = ClinicTools::new();
        let outcome = tools
            .execute(SYMPTOMS_ANALYZE, &definition(), &json!({ "text": "my chest hurts" }))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.output["severity"], "emergency");
        assert_eq!(outcome.metadata.unwrap()["severity"], "emergency");
    }

    #[tokio::test]
    async fn lookup_failures_are_ordinary_outcomes() {
        let tools = ClinicTools::new();
        let outcome = tools
            .execute(CLINIC_LOOKUP, &definition(), &json!({ "postcode": "9999" }))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.render().contains("no clinic serves postcode 9999"));
    }

    #[tokio::test]
    async fn every_call_is_recorded() {
        let tools = ClinicTools::new();
        tools.execute("pharmacy.find", &definition(), &json!({})).await.unwrap();
        tools
            .execute(CLINIC_LOOKUP, &definition(), &json!({ "postcode": "0150" }))
            .await
            .unwrap();
        assert_eq!(tools.calls(), vec!["pharmacy.find", CLINIC_LOOKUP]);
    }
}
