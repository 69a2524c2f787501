//! Wiring for the triage reference agent.
//!
//! `TriageRig` assembles a `Runtime` from the embedded agent specification,
//! the engine settings, the scripted backend and the mock tools, using the
//! production gate, stores and argument verifier. It keeps a handle on each
//! collaborator so scenarios can inspect them after a run.

use std::sync::Arc;

use tracing::info;

use waypoint_contracts::{config::EngineConfig, error::EngineResult, spec::Specification};
use waypoint_core::Runtime;
use waypoint_policy::{load_engine_config_str, PolicyGate};
use waypoint_store::{HashChainRunSink, InMemoryMemoryStore};
use waypoint_verify::{load_specification_str, SchemaArgumentVerifier};

use crate::backend::ScriptedBackend;
use crate::tools::ClinicTools;

/// Embedded agent specification.
pub const TRIAGE_AGENT: &str = include_str!("../agents/triage.toml");

/// Embedded engine settings.
pub const ENGINE_SETTINGS: &str = include_str!("../agents/engine.toml");

pub fn triage_specification() -> EngineResult<Specification> {
    load_specification_str(TRIAGE_AGENT)
}

pub fn engine_config() -> EngineResult<EngineConfig> {
    load_engine_config_str(ENGINE_SETTINGS)
}

pub struct TriageRig {
    pub runtime: Runtime,
    pub backend: Arc<ScriptedBackend>,
    pub tools: Arc<ClinicTools>,
    pub memory: Arc<InMemoryMemoryStore>,
    pub run_log: HashChainRunSink,
}

impl TriageRig {
    /// Wire the triage agent with the embedded engine settings.
    pub fn new(backend: ScriptedBackend) -> EngineResult<Self> {
        Self::with_config(backend, engine_config()?)
    }

    pub fn with_config(backend: ScriptedBackend, config: EngineConfig) -> EngineResult<Self> {
        let spec = Arc::new(triage_specification()?);
        let backend = Arc::new(backend);
        let tools = Arc::new(ClinicTools::new());
        let memory = Arc::new(InMemoryMemoryStore::new());
        let run_log = HashChainRunSink::new();

        info!(
            agent = %spec.agent.id,
            max_total_iterations = config.max_total_iterations,
            "wiring triage runtime"
        );

        let runtime = Runtime::new(
            Arc::clone(&spec),
            backend.clone(),
            tools.clone(),
            memory.clone(),
            Arc::new(run_log.clone()),
            Arc::new(PolicyGate::new(spec)),
            config,
        )?
        .with_verifier(Arc::new(SchemaArgumentVerifier::new()));

        Ok(Self {
            runtime,
            backend,
            tools,
            memory,
            run_log,
        })
    }

    /// Namespace the runtime uses for `notes.*` in `session_id`.
    pub fn notes_namespace(&self, session_id: &str) -> String {
        format!("notes/{}/{}", self.runtime.spec().agent.id, session_id)
    }
}

#[cfg(test)]
mod tests {
    use waypoint_verify::SpecValidator;

    use super::*;

    #[test]
    fn embedded_agent_loads_without_warnings() {
        let spec: Specification = toml::from_str(TRIAGE_AGENT).unwrap();
        let outcome = SpecValidator::strict().validate(&spec);
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(spec.states.len(), 4);
    }

    #[test]
    fn embedded_settings_load() {
        let config = engine_config().unwrap();
        assert_eq!(config.max_iterations_per_state, 6);
        assert_eq!(config.call_timeout_ms, Some(5000));
        assert!(config.enable_policy_gate);
    }

    #[test]
    fn rig_wires_a_runtime() {
        let rig = TriageRig::new(ScriptedBackend::new(vec![])).unwrap();
        assert_eq!(rig.runtime.spec().initial_state, "welcome");
        assert_eq!(rig.notes_namespace("s1"), "notes/symptom-triage/s1");
        assert!(rig.run_log.is_empty());
    }
}
