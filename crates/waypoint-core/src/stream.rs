//! Assembly of streamed backend responses.
//!
//! Streaming backends emit partial events: text deltas and tool-call
//! fragments whose name and arguments may be split across many chunks.
//! `StreamCollector` folds them into one complete `ChatResponse`, so the rest
//! of the loop only ever sees whole tool calls.

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::warn;

use waypoint_contracts::{
    error::EngineResult,
    message::ToolCall,
    run::{FinishReason, TokenUsage},
};

use crate::traits::{AssistantTurn, ChatResponse};

/// One partial response event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    /// A fragment of a tool call. Fragments with the same `id` are
    /// concatenated; `name` is taken from the first fragment that carries it.
    ToolCallDelta {
        id: String,
        name: Option<String>,
        arguments: String,
    },
    Usage(TokenUsage),
    Finish(FinishReason),
}

#[derive(Debug, Default)]
struct PartialToolCall {
    name: String,
    arguments: String,
}

/// Accumulates `StreamEvent`s into a `ChatResponse`.
#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    tool_calls: HashMap<String, PartialToolCall>,
    tool_call_order: Vec<String>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta(delta) => self.text.push_str(&delta),
            StreamEvent::ToolCallDelta { id, name, arguments } => {
                let partial = match self.tool_calls.entry(id.clone()) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        self.tool_call_order.push(id);
                        e.insert(PartialToolCall::default())
                    }
                };
                if let Some(name) = name.filter(|n| !n.is_empty()) {
                    if partial.name.is_empty() {
                        partial.name = name;
                    }
                }
                partial.arguments.push_str(&arguments);
            }
            StreamEvent::Usage(usage) => self.usage = Some(usage),
            StreamEvent::Finish(reason) => self.finish_reason = Some(reason),
        }
    }

    /// Finish collecting. Tool calls come out in first-seen order; fragments
    /// that never received a name are dropped.
    pub fn finish(self) -> ChatResponse {
        let mut remaining = self.tool_calls;
        let mut tool_calls = Vec::with_capacity(self.tool_call_order.len());

        for id in self.tool_call_order {
            let Some(partial) = remaining.remove(&id) else {
                continue;
            };
            if partial.name.is_empty() {
                warn!(call_id = %id, "dropping streamed tool call without a name");
                continue;
            }
            let arguments = if partial.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&partial.arguments).unwrap_or(Value::String(partial.arguments))
            };
            tool_calls.push(ToolCall::new(id, partial.name, arguments));
        }

        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        ChatResponse {
            message: AssistantTurn {
                content: self.text,
                tool_calls,
            },
            usage: self.usage,
            finish_reason,
        }
    }
}

/// Drain a stream of events into a complete response, stopping at the first
/// error.
pub async fn collect_stream<S>(events: S) -> EngineResult<ChatResponse>
where
    S: Stream<Item = EngineResult<StreamEvent>>,
{
    let mut collector = StreamCollector::new();
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        collector.process(event?);
    }
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use serde_json::json;

    use waypoint_contracts::error::EngineError;

    use super::*;

    fn delta(id: &str, name: Option<&str>, args: &str) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            id: id.to_string(),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn text_deltas_concatenate() {
        let mut collector = StreamCollector::new();
        collector.process(StreamEvent::TextDelta("Hel".to_string()));
        collector.process(StreamEvent::TextDelta("lo".to_string()));
        let response = collector.finish();
        assert_eq!(response.message.content, "Hello");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn tool_call_fragments_assemble_in_first_seen_order() {
        let mut collector = StreamCollector::new();
        collector.process(delta("b", Some("clinic.lookup"), "{\"city\":"));
        collector.process(delta("a", Some("symptoms.analyze"), "{\"text\":\"fe"));
        collector.process(delta("b", None, "\"Oslo\"}"));
        collector.process(delta("a", None, "ver\"}"));

        let response = collector.finish();
        let calls = response.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "b");
        assert_eq!(calls[0].arguments, json!({ "city": "Oslo" }));
        assert_eq!(calls[1].name, "symptoms.analyze");
        assert_eq!(calls[1].arguments, json!({ "text": "fever" }));
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn nameless_fragments_are_dropped() {
        let mut collector = StreamCollector::new();
        collector.process(delta("x", None, "{}"));
        assert!(collector.finish().message.tool_calls.is_empty());
    }

    #[test]
    fn unparseable_arguments_are_kept_as_text() {
        let mut collector = StreamCollector::new();
        collector.process(delta("x", Some("kb.search"), "{broken"));
        let calls = collector.finish().message.tool_calls;
        assert_eq!(calls[0].arguments, json!("{broken"));
    }

    #[tokio::test]
    async fn collect_stream_reports_usage_and_finish() {
        let events = stream::iter(vec![
            Ok(StreamEvent::TextDelta("done".to_string())),
            Ok(StreamEvent::Usage(TokenUsage::new(12, 3))),
            Ok(StreamEvent::Finish(FinishReason::Length)),
        ]);
        let response = collect_stream(events).await.unwrap();
        assert_eq!(response.usage, Some(TokenUsage::new(12, 3)));
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn collect_stream_stops_on_error() {
        let events = stream::iter(vec![
            Ok(StreamEvent::TextDelta("partial".to_string())),
            Err(EngineError::backend("connection reset")),
        ]);
        assert_eq!(
            collect_stream(events).await,
            Err(EngineError::backend("connection reset"))
        );
    }
}
