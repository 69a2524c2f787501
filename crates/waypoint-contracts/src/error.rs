//! Engine error types.
//!
//! All fallible engine operations return `EngineResult<T>`. Tool-level
//! failures and policy violations are deliberately absent: the former travel
//! back to the model as `success: false` tool results and the latter become a
//! corrective conversation turn. What remains here breaks the control flow of
//! a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which iteration budget a run exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationScope {
    /// The per-state cap (state override or `max_iterations_per_state`).
    State,
    /// The whole-call cap `max_total_iterations`.
    Total,
}

impl fmt::Display for IterationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationScope::State => f.write_str("per-state"),
            IterationScope::Total => f.write_str("total"),
        }
    }
}

/// The unified error type for the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The specification references a state identifier that does not exist.
    #[error("unknown state '{state_id}'")]
    UnknownState { state_id: String },

    /// The loop ran out of iterations without a natural stop and no fallback
    /// state could absorb the overflow.
    #[error("{scope} iteration limit of {limit} exceeded in state '{state_id}'")]
    IterationLimitExceeded {
        state_id: String,
        limit: u32,
        scope: IterationScope,
    },

    /// The model backend or a tool transport failed or timed out.
    #[error("backend error: {reason}")]
    Backend { reason: String },

    /// The memory store or run sink could not read or persist data.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// The caller cancelled the run.
    #[error("run cancelled")]
    Cancelled,

    /// The specification failed structural validation.
    #[error("invalid specification: {reason}")]
    InvalidSpecification { reason: String },

    /// A configuration document is missing or malformed.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl EngineError {
    pub fn unknown_state(state_id: impl Into<String>) -> Self {
        Self::UnknownState {
            state_id: state_id.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the Waypoint crates.
pub type EngineResult<T> = Result<T, EngineError>;
