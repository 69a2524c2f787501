//! # waypoint-core
//!
//! The execution engine for Waypoint agents.
//!
//! This crate provides:
//! - The prompt compiler (`compiler::compile`), a pure function of
//!   specification, state and options
//! - The conversational `StateMachine` and its trigger evaluation
//! - The `Runtime` loop that wires backend, gate, tools, memory and run sink
//!   together under iteration bounds
//! - The collaborator traits (`ModelBackend`, `ToolExecutor`, `MemoryStore`,
//!   `RunSink`, `ToolGate`, `ArgumentVerifier`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waypoint_core::{Runtime, traits::{ModelBackend, ToolExecutor, MemoryStore, RunSink, ToolGate}};
//! ```

pub mod cancel;
pub mod compiler;
pub mod condition;
pub mod runtime;
pub mod state_machine;
pub mod stream;
pub mod traits;

pub use cancel::RunCancellationToken;
pub use compiler::{compile, CompileOptions, CompiledPrompt, RetrievalHint, ToolChoice, ToolSpec};
pub use runtime::{RunFailed, Runtime, TurnOutcome};
pub use state_machine::{StateMachine, TransitionContext, TransitionOutcome};
