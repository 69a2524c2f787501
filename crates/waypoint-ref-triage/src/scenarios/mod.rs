//! Triage reference scenarios.
//!
//! Each scenario drives the real Waypoint runtime (compiler, state machine,
//! policy gate, argument verifier, memory store and hash-chained run log)
//! with a scripted backend and mock tools, then prints what happened.

pub mod runaway_guard;
pub mod tool_correction;
pub mod triage_intake;

use waypoint_contracts::run::Run;

/// Print one line per step of `run`.
pub(crate) fn print_run(run: &Run) {
    println!(
        "  Run {} [{:?}]: {} step(s), {} tool call(s), {} tokens, cost {:.6}",
        run.id,
        run.status,
        run.steps.len(),
        run.tool_call_count(),
        run.usage.total_tokens,
        run.cost
    );
    for step in &run.steps {
        let mut line = format!("    #{} {:<8}", step.index, step.state_id);
        if !step.blocked_tools.is_empty() {
            line.push_str(&format!(" BLOCKED {}", step.blocked_tools.join(", ")));
        } else if !step.tool_results.is_empty() {
            let results: Vec<String> = step
                .tool_results
                .iter()
                .map(|r| format!("{} {}", r.name, if r.outcome.success { "ok" } else { "failed" }))
                .collect();
            line.push_str(&format!(" tools: {}", results.join(", ")));
        } else {
            line.push_str(&format!(" says: {}", step.output));
        }
        if let Some(transition) = &step.transition {
            line.push_str(&format!("  -> {}", transition.to));
        }
        println!("{line}");
    }
    if let Some(error) = &run.error {
        println!("    error: {error}");
    }
}

/// Print the outcome of the run log's integrity check.
pub(crate) fn print_chain(verified: bool, runs: usize) {
    println!(
        "  Run log integrity:      {} ({} run(s) in chain)",
        if verified { "VERIFIED" } else { "FAILED" },
        runs
    );
}
