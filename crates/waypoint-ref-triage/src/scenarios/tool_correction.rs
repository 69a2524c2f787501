//! Scenario 2: Tool Correction
//!
//! An untrusted model jumps the gun and has to be corrected twice before a
//! red-flag caller reaches a nurse.
//!
//! Walk-through:
//!   1. In `welcome` the model calls `symptoms.analyze`, which that state does
//!      not allow. The policy gate blocks the whole batch, nothing executes,
//!      and a corrective turn lists the tools that are allowed. The caller's
//!      "chest" still fires the intent transition to `triage`.
//!   2. In `triage` the model calls the tool with the wrong argument shape.
//!      The schema verifier rejects it and the model gets a failed tool result.
//!   3. The model retries correctly. The tool reports `emergency` and the
//!      `symptoms.analyze:emergency` trigger moves to `handoff`.
//!   4. `handoff` is terminal, so the final answer ends the conversation.

use serde_json::json;

use waypoint_contracts::{error::EngineResult, message::ChatMessage, session::SessionState};
use waypoint_core::{traits::MemoryStore, TurnOutcome};

use crate::backend::{Reply, ScriptedBackend};
use crate::mock_data::RED_FLAG_CALLER;
use crate::rig::TriageRig;
use crate::scenarios::{print_chain, print_run};
use crate::tools::SYMPTOMS_ANALYZE;

pub const MESSAGE: &str = "My chest hurts and my left arm feels numb.";

#[derive(Debug, Clone)]
pub struct CorrectionReport {
    pub outcome: TurnOutcome,
    pub session: Option<SessionState>,
    pub tools_called: Vec<String>,
    pub chain_verified: bool,
    pub runs_logged: usize,
}

fn script() -> Vec<Reply> {
    vec![
        Reply::call(SYMPTOMS_ANALYZE, json!({ "text": "chest hurts, left arm numb" })),
        Reply::call(SYMPTOMS_ANALYZE, json!({ "symptom": "chest" })),
        Reply::call(SYMPTOMS_ANALYZE, json!({ "text": MESSAGE })),
        Reply::text(
            "This needs attention right now. Please call 113 if anything gets worse; \
             the on-call nurse is joining this call.",
        ),
    ]
}

pub async fn execute() -> EngineResult<CorrectionReport> {
    let rig = TriageRig::new(ScriptedBackend::new(script()))?;
    let session_id = RED_FLAG_CALLER.session_id;

    let outcome = rig
        .runtime
        .process_message(session_id, MESSAGE, None)
        .await
        .map_err(|failed| failed.error)?;
    let session = rig.memory.get_session_state(session_id).await?;

    Ok(CorrectionReport {
        outcome,
        session,
        tools_called: rig.tools.calls(),
        chain_verified: rig.run_log.verify_integrity(),
        runs_logged: rig.run_log.len(),
    })
}

/// Run Scenario 2: Tool Correction.
pub async fn run_scenario() -> EngineResult<()> {
    println!("=== Scenario 2: Tool Correction ===");
    println!();
    println!("  Caller: {} ({})", RED_FLAG_CALLER.name, RED_FLAG_CALLER.session_id);
    println!("  > {MESSAGE}");
    println!();

    let report = execute().await?;

    print_run(&report.outcome.run);
    println!();

    if let Some(session) = &report.session {
        println!("  Conversation as persisted:");
        for message in &session.history {
            let label = match message {
                ChatMessage::User { synthetic: true, .. } => "correction".to_string(),
                ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    format!("assistant -> {}", tool_calls[0].name)
                }
                ChatMessage::Tool { success, .. } => {
                    format!("tool ({})", if *success { "ok" } else { "failed" })
                }
                other => other.role().to_string(),
            };
            println!("    {:<30} {}", label, message.content());
        }
        println!();
    }

    println!("  < {}", report.outcome.final_text);
    println!(
        "  Final state:            {} (terminal: {})",
        report.outcome.current_state, report.outcome.is_terminal
    );
    println!("  External tools called:  {}", report.tools_called.join(", "));
    print_chain(report.chain_verified, report.runs_logged);
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use waypoint_contracts::spec::Trigger;

    use super::*;

    #[tokio::test]
    async fn disallowed_call_is_blocked_and_corrected() {
        let report = execute().await.unwrap();
        let first = &report.outcome.run.steps[0];

        assert_eq!(first.state_id, "welcome");
        assert_eq!(first.blocked_tools, vec![SYMPTOMS_ANALYZE.to_string()]);
        assert!(first.tool_results.is_empty());
        assert_eq!(first.transition.as_ref().unwrap().to, "triage");

        let history = &report.session.as_ref().unwrap().history;
        match &history[2] {
            ChatMessage::User { content, synthetic } => {
                assert!(*synthetic);
                assert!(content.contains("symptoms.analyze"), "{content}");
            }
            other => panic!("expected a corrective turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_arguments_never_reach_the_tool() {
        let report = execute().await.unwrap();
        let second = &report.outcome.run.steps[1];

        assert_eq!(second.state_id, "triage");
        let outcome = &second.tool_results[0].outcome;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("invalid arguments"));
        assert!(second.transition.is_none());

        // Only the corrected call was executed.
        assert_eq!(report.tools_called, vec![SYMPTOMS_ANALYZE]);
    }

    #[tokio::test]
    async fn emergency_result_hands_off_to_a_nurse() {
        let report = execute().await.unwrap();
        let run = &report.outcome.run;

        assert_eq!(run.steps.len(), 4);
        assert_eq!(
            run.steps[2].transition.as_ref().unwrap().trigger,
            Some(Trigger::ToolResult("symptoms.analyze:emergency".to_string()))
        );
        assert_eq!(report.outcome.current_state, "handoff");
        assert!(report.outcome.is_terminal);

        let session = report.session.unwrap();
        assert_eq!(session.current_state, "handoff");
        assert_eq!(session.metadata["severity"], "emergency");
        assert_eq!(
            session.history.iter().map(ChatMessage::role).collect::<Vec<_>>(),
            vec!["user", "assistant", "user", "assistant", "tool", "assistant", "tool", "assistant"]
        );
    }
}
