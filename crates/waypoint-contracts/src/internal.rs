//! Reserved tools the engine always allows and handles itself.

use serde_json::json;

use crate::spec::{ToolDefinition, ToolTransport};

pub const KB_SEARCH: &str = "kb.search";
pub const KB_OPEN: &str = "kb.open";
pub const NOTES_READ: &str = "notes.read";
pub const NOTES_WRITE: &str = "notes.write";

/// Internal tool names in the order they are appended to the tool appendix.
pub const INTERNAL_TOOL_NAMES: [&str; 4] = [KB_SEARCH, KB_OPEN, NOTES_READ, NOTES_WRITE];

pub fn is_internal_tool(name: &str) -> bool {
    INTERNAL_TOOL_NAMES.contains(&name)
}

/// Built-in definition of a reserved tool, or `None` for any other name.
pub fn internal_tool_definition(name: &str) -> Option<ToolDefinition> {
    let (description, parameters) = match name {
        KB_SEARCH => (
            "Search the agent knowledge base and return matching document identifiers.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 }
                },
                "required": ["query"]
            }),
        ),
        KB_OPEN => (
            "Open a knowledge base document by identifier.",
            json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }),
        ),
        NOTES_READ => (
            "Read a note previously saved for this conversation.",
            json!({
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }),
        ),
        NOTES_WRITE => (
            "Save a note for this conversation so later turns can read it.",
            json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "value": {},
                    "ttl_seconds": { "type": "integer", "minimum": 1 }
                },
                "required": ["key", "value"]
            }),
        ),
        _ => return None,
    };

    Some(ToolDefinition {
        description: description.to_string(),
        parameters,
        transport: ToolTransport::Internal,
    })
}
