//! A scripted, streaming model backend.
//!
//! `ScriptedBackend` replays a fixed list of replies. Each reply is chopped
//! into the partial events a streaming provider would send (word-sized text
//! deltas, tool-call argument fragments, a usage report) and reassembled with
//! `waypoint_core::stream::collect_stream`, so the reference agent goes
//! through the same assembly path a real provider integration would.
//!
//! The backend is untrusted by default: it proposes whatever its script says,
//! regardless of the tools it was offered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use tracing::debug;

use waypoint_contracts::{
    error::{EngineError, EngineResult},
    message::ChatMessage,
    run::{FinishReason, TokenUsage},
};
use waypoint_core::{
    compiler::ToolChoice,
    stream::{collect_stream, StreamEvent},
    traits::{ChatRequest, ChatResponse, ModelBackend},
};

/// One scripted assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// `(tool name, arguments)`; call ids are assigned when the reply is sent.
    pub tool_calls: Vec<(String, Value)>,
    /// Overrides the finish reason the stream would otherwise imply.
    pub finish: Option<FinishReason>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            finish: None,
        }
    }

    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![(name.into(), arguments)],
            finish: None,
        }
    }

    /// Add another tool call to the same assistant turn.
    pub fn and_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls.push((name.into(), arguments));
        self
    }

    pub fn finishing(mut self, reason: FinishReason) -> Self {
        self.finish = Some(reason);
        self
    }
}

/// What the engine offered on one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferedTools {
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
    pub message_count: usize,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    /// Replayed forever once the script runs out.
    repeat: Option<Reply>,
    enforces_tool_choice: bool,
    next_call_id: AtomicU32,
    offered: Mutex<Vec<OfferedTools>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// A backend that sends `reply` on every call, for as long as it is asked.
    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    /// Claim native tool-choice enforcement.
    pub fn trusted(mut self) -> Self {
        self.enforces_tool_choice = true;
        self
    }

    /// Tool lists offered so far, one entry per backend call.
    pub fn offered(&self) -> Vec<OfferedTools> {
        self.offered.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_reply(&self) -> EngineResult<Reply> {
        let scripted = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        scripted
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| EngineError::backend("scripted backend has no reply left"))
    }

    /// Chop `reply` into the events a streaming provider would emit.
    fn events(&self, reply: &Reply, prompt_tokens: u64) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = reply
            .text
            .split_inclusive(' ')
            .map(|word| StreamEvent::TextDelta(word.to_string()))
            .collect();

        let mut completion_chars = reply.text.len();
        for (name, arguments) in &reply.tool_calls {
            let id = format!("call-{}", self.next_call_id.fetch_add(1, Ordering::Relaxed) + 1);
            let encoded = arguments.to_string();
            completion_chars += name.len() + encoded.len();

            let mut split = encoded.len() / 2;
            while !encoded.is_char_boundary(split) {
                split += 1;
            }
            let (head, tail) = encoded.split_at(split);
            events.push(StreamEvent::ToolCallDelta {
                id: id.clone(),
                name: Some(name.clone()),
                arguments: head.to_string(),
            });
            events.push(StreamEvent::ToolCallDelta {
                id,
                name: None,
                arguments: tail.to_string(),
            });
        }

        events.push(StreamEvent::Usage(TokenUsage::new(
            prompt_tokens,
            estimate_tokens(completion_chars),
        )));
        if let Some(reason) = reply.finish {
            events.push(StreamEvent::Finish(reason));
        }
        events
    }
}

/// Roughly four characters per token.
fn estimate_tokens(chars: usize) -> u64 {
    u64::try_from(chars.div_ceil(4)).unwrap_or(u64::MAX)
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest<'_>) -> EngineResult<ChatResponse> {
        self.offered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(OfferedTools {
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
                tool_choice: request.tool_choice,
                message_count: request.messages.len(),
            });

        let reply = self.next_reply()?;
        let prompt_chars: usize = request.messages.iter().map(|m| ChatMessage::content(m).len()).sum();
        let events = self.events(&reply, estimate_tokens(prompt_chars));
        debug!(events = events.len(), tool_calls = reply.tool_calls.len(), "streaming scripted reply");

        collect_stream(stream::iter(events.into_iter().map(Ok))).await
    }

    fn supports_tool_choice(&self) -> bool {
        self.enforces_tool_choice
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request<'a>(messages: &'a [ChatMessage]) -> ChatRequest<'a> {
        ChatRequest {
            messages,
            tools: &[],
            tool_choice: ToolChoice::None,
            temperature: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn replies_are_reassembled_from_stream_events() {
        let backend = ScriptedBackend::new(vec![
            Reply::text("Hello there, how can I help?"),
            Reply::call("symptoms.analyze", json!({ "text": "rash on my arm" }))
                .and_call("notes.write", json!({ "key": "k", "value": "ü" })),
        ]);
        let messages = [ChatMessage::user("hi")];

        let first = backend.chat(request(&messages)).await.unwrap();
        assert_eq!(first.message.content, "Hello there, how can I help?");
        assert_eq!(first.finish_reason, FinishReason::Stop);

        let second = backend.chat(request(&messages)).await.unwrap();
        let calls = second.message.tool_calls;
        assert_eq!(second.finish_reason, FinishReason::ToolCalls);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call-1");
        assert_eq!(calls[0].arguments, json!({ "text": "rash on my arm" }));
        assert_eq!(calls[1].arguments, json!({ "key": "k", "value": "ü" }));
        assert!(second.usage.unwrap().completion_tokens > 0);
    }

    #[tokio::test]
    async fn exhausted_script_is_a_backend_error() {
        let backend = ScriptedBackend::new(vec![]);
        let result = backend.chat(request(&[])).await;
        assert!(matches!(result, Err(EngineError::Backend { .. })));
    }

    #[tokio::test]
    async fn repeating_backend_never_runs_dry() {
        let backend = ScriptedBackend::repeating(Reply::text("again").finishing(FinishReason::Length));
        for _ in 0..3 {
            let response = backend.chat(request(&[])).await.unwrap();
            assert_eq!(response.finish_reason, FinishReason::Length);
        }
        assert_eq!(backend.offered().len(), 3);
        assert!(!backend.supports_tool_choice());
        assert!(backend.trusted().supports_tool_choice());
    }
}
