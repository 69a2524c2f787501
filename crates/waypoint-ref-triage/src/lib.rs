//! # waypoint-ref-triage
//!
//! Symptom triage reference agent for the Waypoint runtime.
//!
//! The agent is described in `agents/triage.toml` and runs on the real engine
//! crates. Only the edges are simulated: a scripted streaming backend stands
//! in for the language model and `mock_data` stands in for the symptom and
//! clinic services.
//!
//! ## Scenarios
//!
//! 1. **Triage Intake**: two turns from greeting to a booked clinic slot,
//!    driven by intent and condition triggers.
//! 2. **Tool Correction**: a disallowed call is blocked and corrected, bad
//!    arguments are rejected, and an emergency result hands off to a nurse.
//! 3. **Runaway Guard**: a looping model falls back to the handoff state and
//!    is then stopped by the total iteration limit; a cancelled run is still
//!    logged.

pub mod backend;
pub mod mock_data;
pub mod rig;
pub mod scenarios;
pub mod tools;

pub use backend::{Reply, ScriptedBackend};
pub use rig::TriageRig;
pub use tools::ClinicTools;
