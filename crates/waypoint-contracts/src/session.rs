//! Per-session conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::ChatMessage;

/// Everything the runtime carries between `process_message` calls for one
/// session. Owned by a single in-flight call at a time and persisted through
/// the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub current_state: String,
    /// When `current_state` was entered. Timeout triggers measure from here,
    /// across turns.
    pub state_entered_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Variable namespace for `condition` triggers (`metadata.*`).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, initial_state: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            current_state: initial_state.into(),
            state_entered_at: now,
            history: Vec::new(),
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.updated_at = Utc::now();
    }

    /// Content of the most recent message the user actually sent. Corrective
    /// turns injected by the engine are skipped so they cannot fire intents.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|m| match m {
            ChatMessage::User {
                content,
                synthetic: false,
            } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Content of the most recent assistant message.
    pub fn latest_assistant_message(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|m| match m {
            ChatMessage::Assistant { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }
}
