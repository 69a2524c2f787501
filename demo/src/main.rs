//! Waypoint Triage Reference Agent — Demo CLI
//!
//! Runs the triage scenarios against the real engine, prints the prompt the
//! compiler builds for a state, or checks a specification file.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- triage-intake
//!   cargo run -p demo -- tool-correction
//!   cargo run -p demo -- runaway-guard
//!   cargo run -p demo -- prompt triage
//!   cargo run -p demo -- check path/to/agent.toml --settings path/to/engine.toml --strict

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use waypoint_contracts::error::{EngineError, EngineResult};
use waypoint_core::{compile, CompileOptions};
use waypoint_policy::load_engine_config_file;
use waypoint_ref_triage::{
    rig::{engine_config, triage_specification},
    scenarios::{runaway_guard, tool_correction, triage_intake},
};
use waypoint_verify::{load_specification_str_with, SpecValidator};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Waypoint — state-machine agent execution engine demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Waypoint triage reference agent demo",
    long_about = "Runs the symptom triage scenarios showing state transitions,\n\
                  tool gating, argument verification, iteration bounds and run log integrity."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three triage scenarios in sequence.
    RunAll,
    /// Scenario 1: greeting to booked clinic slot over two turns.
    TriageIntake,
    /// Scenario 2: blocked call, rejected arguments, emergency handoff.
    ToolCorrection,
    /// Scenario 3: fallback and iteration limits stop a looping model.
    RunawayGuard,
    /// Print the compiled prompt for a state of the triage agent.
    Prompt {
        /// State identifier (welcome, triage, booking, handoff).
        state: String,
    },
    /// Validate a specification file and, optionally, engine settings.
    Check {
        spec: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Treat malformed condition triggers as errors.
        #[arg(long)]
        strict: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::RunAll => {
            print_banner();
            run_all().await
        }
        Command::TriageIntake => {
            print_banner();
            triage_intake::run_scenario().await
        }
        Command::ToolCorrection => {
            print_banner();
            tool_correction::run_scenario().await
        }
        Command::RunawayGuard => {
            print_banner();
            runaway_guard::run_scenario().await
        }
        Command::Prompt { state } => print_prompt(&state),
        Command::Check {
            spec,
            settings,
            strict,
        } => check(&spec, settings.as_deref(), strict),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn run_all() -> EngineResult<()> {
    triage_intake::run_scenario().await?;
    tool_correction::run_scenario().await?;
    runaway_guard::run_scenario().await?;
    println!("All scenarios completed.");
    Ok(())
}

fn print_prompt(state: &str) -> EngineResult<()> {
    let spec = triage_specification()?;
    let options = CompileOptions::from_config(&engine_config()?);
    let prompt = compile(&spec, state, &options)?;

    println!("{}", prompt.system);
    println!();
    println!("tool_choice: {:?}", prompt.tool_choice);
    for tool in &prompt.tools {
        println!("  - {}", tool.name);
    }
    Ok(())
}

fn check(spec_path: &Path, settings: Option<&Path>, strict: bool) -> EngineResult<()> {
    let contents = std::fs::read_to_string(spec_path).map_err(|e| EngineError::ConfigError {
        reason: format!("failed to read specification '{}': {}", spec_path.display(), e),
    })?;
    let validator = if strict { SpecValidator::strict() } else { SpecValidator::new() };
    let spec = load_specification_str_with(&contents, &validator)?;
    println!(
        "{}: agent '{}' with {} state(s) and {} tool(s) is valid",
        spec_path.display(),
        spec.agent.id,
        spec.states.len(),
        spec.tools.len()
    );

    if let Some(path) = settings {
        let config = load_engine_config_file(path)?;
        println!(
            "{}: {} iteration(s) per state, {} per call, policy gate {}",
            path.display(),
            config.max_iterations_per_state,
            config.max_total_iterations,
            if config.enable_policy_gate { "on" } else { "off" }
        );
    }
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Waypoint — Agent Execution Engine");
    println!("Symptom Triage Reference Demo");
    println!("=================================");
    println!();
    println!("Per iteration:");
    println!("  [1] Compile the prompt for the current state (tools = state allow-list)");
    println!("  [2] Call the backend (untrusted: it may propose any tool)");
    println!("  [3] Gate the proposed calls; a blocked batch becomes a corrective turn");
    println!("  [4] Verify arguments, run tools, merge tool metadata into the session");
    println!("  [5] Evaluate transitions by priority; stop on a natural answer");
    println!("  [6] Persist the session; append the run to the SHA-256 chained log");
    println!();
}
