//! Tool gate verdict types.
//!
//! The gate is deny-by-default: any proposed tool call whose name is outside
//! the active state's effective allow-list is blocked, and a single blocked
//! call blocks the whole batch.

use serde::{Deserialize, Serialize};

use crate::message::ToolCall;

/// The gate's decision for one batch of proposed tool calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// True only when `blocked` is empty.
    pub allowed: bool,
    /// Names outside the allow-list, each reported once, in call order.
    pub blocked: Vec<String>,
    /// Human-readable explanation when something was blocked.
    pub reason: Option<String>,
}

impl GateVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            blocked: Vec::new(),
            reason: None,
        }
    }
}

/// Best-effort partition of a batch into calls that may run and calls that
/// may not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredCalls {
    pub allowed: Vec<ToolCall>,
    pub blocked: Vec<ToolCall>,
}
