//! Scenario 3: Runaway Guard
//!
//! A model stuck retrying the (unimplemented) knowledge-base search never
//! produces an answer. The iteration bounds stop it.
//!
//! Walk-through:
//!   1. `welcome` → `triage` on the caller's "rash"; every reply is another
//!      `kb.search`, which reports `not_implemented`.
//!   2. `triage` allows four iterations. When they run out the machine falls
//!      back to `handoff` instead of failing.
//!   3. `handoff` keeps looping until the total budget of eight iterations is
//!      spent; the run ends `Failed` with a total-scope limit error.
//!   4. A second caller's run is cancelled before it starts. Both runs are
//!      still persisted to the hash-chained run log.

use serde_json::json;

use waypoint_contracts::{error::EngineResult, session::SessionState};
use waypoint_core::{traits::MemoryStore, RunCancellationToken, RunFailed, TurnOutcome};
use waypoint_policy::load_engine_config_str;

use crate::backend::{Reply, ScriptedBackend};
use crate::mock_data::{ROUTINE_CALLER, STUCK_CALLER};
use crate::rig::TriageRig;
use crate::scenarios::{print_chain, print_run};

pub const MESSAGE: &str = "I have a rash on my arm that keeps spreading.";

/// Tighter bounds than the stock settings so the guard trips quickly.
const GUARD_SETTINGS: &str = r#"
max_iterations_per_state = 6
max_total_iterations = 8
history_window = 8
"#;

#[derive(Debug, Clone)]
pub struct RunawayReport {
    pub runaway: Result<TurnOutcome, RunFailed>,
    pub runaway_session: Option<SessionState>,
    pub cancelled: Result<TurnOutcome, RunFailed>,
    pub chain_verified: bool,
    pub runs_logged: usize,
}

pub async fn execute() -> EngineResult<RunawayReport> {
    let backend = ScriptedBackend::repeating(Reply::call("kb.search", json!({ "query": "spreading rash" })));
    let rig = TriageRig::with_config(backend, load_engine_config_str(GUARD_SETTINGS)?)?;

    let runaway = rig
        .runtime
        .process_message(STUCK_CALLER.session_id, MESSAGE, None)
        .await;
    let runaway_session = rig.memory.get_session_state(STUCK_CALLER.session_id).await?;

    let token = RunCancellationToken::new();
    token.cancel();
    let cancelled = rig
        .runtime
        .process_message(ROUTINE_CALLER.session_id, "Hello?", Some(&token))
        .await;

    Ok(RunawayReport {
        runaway,
        runaway_session,
        cancelled,
        chain_verified: rig.run_log.verify_integrity(),
        runs_logged: rig.run_log.len(),
    })
}

fn print_result(label: &str, result: &Result<TurnOutcome, RunFailed>) {
    match result {
        Ok(outcome) => {
            println!("  {label}: completed in '{}'", outcome.current_state);
            print_run(&outcome.run);
        }
        Err(failed) => {
            println!("  {label}: {}", failed.error);
            print_run(&failed.run);
        }
    }
}

/// Run Scenario 3: Runaway Guard.
pub async fn run_scenario() -> EngineResult<()> {
    println!("=== Scenario 3: Runaway Guard ===");
    println!();
    println!("  Caller: {} ({})", STUCK_CALLER.name, STUCK_CALLER.session_id);
    println!("  > {MESSAGE}");
    println!("  Limits: triage 4 iterations, any other state 6, whole call 8");
    println!();

    let report = execute().await?;

    print_result("Looping run", &report.runaway);
    if let Some(session) = &report.runaway_session {
        println!(
            "  Session parked in:      {} ({} message(s) kept)",
            session.current_state,
            session.history.len()
        );
    }
    println!();

    print_result("Cancelled run", &report.cancelled);
    println!();

    print_chain(report.chain_verified, report.runs_logged);
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use waypoint_contracts::{
        error::{EngineError, IterationScope},
        run::RunStatus,
    };

    use super::*;

    #[tokio::test]
    async fn exhausted_state_falls_back_then_total_limit_stops_the_run() {
        let report = execute().await.unwrap();
        let failed = report.runaway.unwrap_err();

        assert_eq!(
            failed.error,
            EngineError::IterationLimitExceeded {
                state_id: "handoff".to_string(),
                limit: 8,
                scope: IterationScope::Total,
            }
        );
        assert_eq!(failed.run.status, RunStatus::Failed);
        assert_eq!(failed.run.steps.len(), 8);

        let states: Vec<&str> = failed.run.steps.iter().map(|s| s.state_id.as_str()).collect();
        assert_eq!(
            states,
            vec!["welcome", "triage", "triage", "triage", "triage", "handoff", "handoff", "handoff"]
        );
    }

    #[tokio::test]
    async fn stub_knowledge_base_reports_not_implemented() {
        let report = execute().await.unwrap();
        let failed = report.runaway.unwrap_err();
        let outcome = &failed.run.steps[0].tool_results[0].outcome;

        assert!(!outcome.success);
        assert_eq!(outcome.output["status"], "not_implemented");
        assert_eq!(outcome.output["tool"], "kb.search");
    }

    #[tokio::test]
    async fn failed_runs_still_persist_the_session() {
        let report = execute().await.unwrap();
        let session = report.runaway_session.unwrap();

        assert_eq!(session.current_state, "handoff");
        // user + 8 × (assistant tool call, tool result)
        assert_eq!(session.history.len(), 17);
    }

    #[tokio::test]
    async fn cancelled_run_is_recorded() {
        let report = execute().await.unwrap();
        let failed = report.cancelled.unwrap_err();

        assert_eq!(failed.error, EngineError::Cancelled);
        assert_eq!(failed.run.status, RunStatus::Cancelled);
        assert!(failed.run.steps.is_empty());

        assert!(report.chain_verified);
        assert_eq!(report.runs_logged, 2);
    }
}
