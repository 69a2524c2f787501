//! The execution loop.
//!
//! One `process_message` call drives a bounded loop:
//!
//!   Compile → Backend → Gate → Tools → Step → Transitions → (stop?)
//!
//! The gate is consulted before any tool runs unless it is disabled by
//! configuration AND the backend enforces tool choice itself. Every message
//! actually exchanged with the backend lands in session history, and the
//! session and run are persisted on every exit path, failures included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use waypoint_contracts::{
    config::EngineConfig,
    error::{EngineError, EngineResult, IterationScope},
    internal::{internal_tool_definition, is_internal_tool, KB_OPEN, KB_SEARCH, NOTES_READ, NOTES_WRITE},
    message::{ChatMessage, ToolCall, ToolOutcome},
    run::{FinishReason, Run, Step, ToolResultRecord, TransitionRecord},
    session::SessionState,
    spec::{Specification, ToolDefinition},
};

use crate::cancel::{guarded, is_cancelled, RunCancellationToken};
use crate::compiler::{compile, CompileOptions, RetrievalHint};
use crate::state_machine::{StateMachine, ToolResultView, TransitionContext};
use crate::traits::{ArgumentVerifier, ChatRequest, MemoryStore, ModelBackend, RunSink, ToolExecutor, ToolGate};

/// Result of one successful `process_message` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub final_text: String,
    pub run: Run,
    pub current_state: String,
    /// True only when the active state is terminal and this call's final
    /// answer was produced while in a terminal state.
    pub is_terminal: bool,
}

/// A failed, cancelled or aborted call. The run has already been persisted.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("run {} ended with {:?}: {error}", .run.id, .run.status)]
pub struct RunFailed {
    pub run: Box<Run>,
    #[source]
    pub error: EngineError,
}

/// What the loop produced when it stopped normally.
struct Answer {
    final_text: String,
    answered_in_terminal: bool,
}

/// The agent execution engine.
///
/// Holds no per-session state; share it behind an `Arc` and call
/// `process_message` for any number of independent sessions.
pub struct Runtime {
    spec: Arc<Specification>,
    backend: Arc<dyn ModelBackend>,
    tools: Arc<dyn ToolExecutor>,
    memory: Arc<dyn MemoryStore>,
    sink: Arc<dyn RunSink>,
    gate: Arc<dyn ToolGate>,
    verifier: Option<Arc<dyn ArgumentVerifier>>,
    retrieval_hints: Vec<RetrievalHint>,
    config: EngineConfig,
}

impl Runtime {
    /// Wire a runtime.
    ///
    /// # Errors
    ///
    /// `UnknownState` or `InvalidSpecification` when the specification
    /// references a state or tool that does not exist.
    pub fn new(
        spec: Arc<Specification>,
        backend: Arc<dyn ModelBackend>,
        tools: Arc<dyn ToolExecutor>,
        memory: Arc<dyn MemoryStore>,
        sink: Arc<dyn RunSink>,
        gate: Arc<dyn ToolGate>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        spec.check_references()?;
        Ok(Self {
            spec,
            backend,
            tools,
            memory,
            sink,
            gate,
            verifier: None,
            retrieval_hints: Vec::new(),
            config,
        })
    }

    /// Check tool arguments against their parameter schema before execution.
    pub fn with_verifier(mut self, verifier: Arc<dyn ArgumentVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Documents rendered into every compiled prompt as retrieval hints.
    pub fn with_retrieval_hints(mut self, hints: Vec<RetrievalHint>) -> Self {
        self.retrieval_hints = hints;
        self
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle one user message for `session_id`.
    ///
    /// # Errors
    ///
    /// `RunFailed` carrying the persisted run when the loop hits an unknown
    /// state, exhausts its iteration bounds, loses the backend, or is
    /// cancelled through `cancel`.
    pub async fn process_message(
        &self,
        session_id: &str,
        user_text: &str,
        cancel: Option<&RunCancellationToken>,
    ) -> Result<TurnOutcome, RunFailed> {
        let mut run = Run::start(session_id);
        info!(run_id = %run.id, session_id = %session_id, "processing message");

        // ── Load or create the session ───────────────────────────────────────
        let mut session = match self.memory.get_session_state(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!(session_id = %session_id, state = %self.spec.initial_state, "new session");
                SessionState::new(session_id, self.spec.initial_state.clone())
            }
            Err(error) => {
                // Nothing was exchanged, so only the run is recorded.
                run.fail(error.to_string());
                self.append_run(&run).await;
                return Err(RunFailed {
                    run: Box::new(run),
                    error,
                });
            }
        };

        session.push(ChatMessage::user(user_text));

        let result = self.drive(&mut run, &mut session, user_text, cancel).await;

        // ── Finalize ─────────────────────────────────────────────────────────
        let mut result = match result {
            Ok(answer) => {
                run.complete();
                Ok(answer)
            }
            Err(EngineError::Cancelled) => {
                run.cancel();
                Err(EngineError::Cancelled)
            }
            Err(error) => {
                run.fail(error.to_string());
                Err(error)
            }
        };

        if let Err(error) = self.memory.set_session_state(session_id, &session).await {
            warn!(run_id = %run.id, session_id = %session_id, error = %error, "failed to persist session");
            if result.is_ok() {
                run.fail(error.to_string());
                result = Err(error);
            }
        }
        self.append_run(&run).await;

        match result {
            Ok(answer) => {
                let is_terminal = answer.answered_in_terminal
                    && self
                        .spec
                        .state(&session.current_state)
                        .is_some_and(|s| s.terminal);
                info!(
                    run_id = %run.id,
                    session_id = %session_id,
                    state = %session.current_state,
                    steps = run.steps.len(),
                    tool_calls = run.tool_call_count(),
                    is_terminal,
                    "run completed"
                );
                Ok(TurnOutcome {
                    final_text: answer.final_text,
                    run,
                    current_state: session.current_state,
                    is_terminal,
                })
            }
            Err(error) => {
                warn!(
                    run_id = %run.id,
                    session_id = %session_id,
                    status = ?run.status,
                    steps = run.steps.len(),
                    error = %error,
                    "run did not complete"
                );
                Err(RunFailed {
                    run: Box::new(run),
                    error,
                })
            }
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        session: &mut SessionState,
        user_text: &str,
        cancel: Option<&RunCancellationToken>,
    ) -> EngineResult<Answer> {
        let mut machine = StateMachine::resume(
            Arc::clone(&self.spec),
            &session.current_state,
            session.state_entered_at,
        )?;
        let options = CompileOptions {
            retrieval_hints: self.retrieval_hints.clone(),
            ..CompileOptions::from_config(&self.config)
        };

        let mut input = Some(user_text.to_string());
        let mut total_iterations: u32 = 0;
        let mut state_iterations: u32 = 0;
        let mut state_tool_calls: u32 = 0;

        loop {
            if is_cancelled(cancel) {
                return Err(EngineError::Cancelled);
            }

            // ── Iteration bounds ─────────────────────────────────────────────
            let state_id = machine.current_state_id().to_string();
            let state_limit = machine
                .current_state()?
                .max_iterations
                .unwrap_or(self.config.max_iterations_per_state);

            if state_iterations >= state_limit {
                warn!(
                    run_id = %run.id,
                    state = %state_id,
                    limit = state_limit,
                    "per-state iteration limit reached"
                );
                if machine.go_to_fallback() {
                    sync_session(session, &machine);
                    state_iterations = 0;
                    state_tool_calls = 0;
                    continue;
                }
                return Err(EngineError::IterationLimitExceeded {
                    state_id,
                    limit: state_limit,
                    scope: IterationScope::State,
                });
            }
            if total_iterations >= self.config.max_total_iterations {
                return Err(EngineError::IterationLimitExceeded {
                    state_id,
                    limit: self.config.max_total_iterations,
                    scope: IterationScope::Total,
                });
            }
            total_iterations += 1;
            state_iterations += 1;

            debug!(
                run_id = %run.id,
                state = %state_id,
                iteration = total_iterations,
                state_iteration = state_iterations,
                "iteration starting"
            );

            // ── Compile and call the backend ─────────────────────────────────
            let prompt = compile(&self.spec, &state_id, &options)?;
            let window = history_window(&session.history, self.config.history_window);
            let mut messages = Vec::with_capacity(window.len() + 1);
            messages.push(ChatMessage::system(prompt.system));
            messages.extend_from_slice(window);

            let request = ChatRequest {
                messages: &messages,
                tools: &prompt.tools,
                tool_choice: prompt.tool_choice,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };

            let started = Instant::now();
            let response = guarded(cancel, self.call_timeout(), "model call", self.backend.chat(request)).await?;
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let usage = response.usage.unwrap_or_default();

            let content = response.message.content;
            let calls = response.message.tool_calls;

            let mut step = Step {
                index: u32::try_from(run.steps.len()).unwrap_or(u32::MAX),
                state_id: state_id.clone(),
                input: input.take(),
                output: content.clone(),
                tool_calls: calls.clone(),
                tool_results: Vec::new(),
                blocked_tools: Vec::new(),
                transition: None,
                usage,
                cost: self.config.cost_per_token.estimate(&usage),
                latency_ms,
                finish_reason: response.finish_reason,
                recorded_at: Utc::now(),
            };

            // ── Tool calls and transitions ───────────────────────────────────
            // An error past this point still records the partial step.
            let settled = async {
                let mut results = Vec::new();
                let mut answer = None;

                if calls.is_empty() {
                    session.push(ChatMessage::assistant(content.clone()));
                    answer = Some(Answer {
                        final_text: content,
                        answered_in_terminal: machine.is_terminal(),
                    });
                } else {
                    let blocked = if self.gate_required() {
                        self.gate.validate(&state_id, &calls)?.blocked
                    } else {
                        Vec::new()
                    };

                    session.push(ChatMessage::assistant_tool_calls(content, calls.clone()));

                    if !blocked.is_empty() {
                        warn!(
                            run_id = %run.id,
                            state = %state_id,
                            blocked = ?blocked,
                            "tool calls blocked, injecting correction"
                        );
                        let correction = self.gate.constraint_message(&state_id, &blocked)?;
                        session.push(ChatMessage::corrective(correction));
                        step.blocked_tools = blocked;
                    } else {
                        for call in &calls {
                            let outcome = self.run_tool(call, &session.session_id, cancel).await?;
                            debug!(
                                run_id = %run.id,
                                state = %state_id,
                                tool = %call.name,
                                success = outcome.success,
                                "tool call finished"
                            );

                            if let Some(updates) = &outcome.metadata {
                                for (key, value) in updates {
                                    session.metadata.insert(key.clone(), value.clone());
                                }
                            }

                            let rendered = outcome.render();
                            session.push(ChatMessage::Tool {
                                call_id: call.id.clone(),
                                name: call.name.clone(),
                                content: rendered.clone(),
                                success: outcome.success,
                            });
                            results.push(ToolResultView {
                                name: call.name.clone(),
                                success: outcome.success,
                                output: rendered,
                            });
                            step.tool_results.push(ToolResultRecord {
                                call_id: call.id.clone(),
                                name: call.name.clone(),
                                outcome,
                            });
                        }
                        state_tool_calls += u32::try_from(calls.len()).unwrap_or(u32::MAX);
                    }
                }

                // ── Transitions ──────────────────────────────────────────────
                let outcome = {
                    let context = TransitionContext {
                        latest_user_message: session.latest_user_message(),
                        latest_assistant_message: session.latest_assistant_message(),
                        tool_results: results,
                        metadata: &session.metadata,
                        iteration: state_iterations,
                        tool_calls_count: state_tool_calls,
                        now: Utc::now(),
                    };
                    machine.evaluate_transitions(&context)?
                };
                if outcome.transitioned {
                    step.transition = Some(TransitionRecord {
                        from: outcome.from,
                        to: outcome.to,
                        trigger: outcome.trigger,
                    });
                    sync_session(session, &machine);
                    state_iterations = 0;
                    state_tool_calls = 0;
                }

                Ok::<_, EngineError>(answer)
            }
            .await;

            let finish_reason = step.finish_reason;
            run.record(step);
            let answer = settled?;

            // ── Stop? ────────────────────────────────────────────────────────
            if let Some(answer) = answer {
                if finish_reason == FinishReason::Stop || machine.is_terminal() {
                    return Ok(answer);
                }
                debug!(
                    run_id = %run.id,
                    finish_reason = ?finish_reason,
                    "candidate answer without natural stop, continuing"
                );
            }
        }
    }

    fn gate_required(&self) -> bool {
        self.config.enable_policy_gate || !self.backend.supports_tool_choice()
    }

    fn call_timeout(&self) -> Option<Duration> {
        self.config.call_timeout_ms.map(Duration::from_millis)
    }

    async fn run_tool(
        &self,
        call: &ToolCall,
        session_id: &str,
        cancel: Option<&RunCancellationToken>,
    ) -> EngineResult<ToolOutcome> {
        let internal = is_internal_tool(&call.name);
        let definition: Option<ToolDefinition> = if internal {
            internal_tool_definition(&call.name)
        } else {
            self.spec.tools.get(&call.name).cloned()
        };
        let Some(definition) = definition else {
            return Ok(ToolOutcome::failed(format!("tool '{}' is not registered", call.name)));
        };

        if let Some(verifier) = &self.verifier {
            let report = verifier.verify(&call.name, &definition, &call.arguments);
            if !report.passed {
                warn!(tool = %call.name, failures = %report.summary(), "tool arguments rejected");
                return Ok(ToolOutcome::failed(format!("invalid arguments: {}", report.summary())));
            }
        }

        if internal {
            let namespace = format!("notes/{}/{}", self.spec.agent.id, session_id);
            let result = guarded(
                cancel,
                self.call_timeout(),
                "internal tool call",
                self.run_internal(&namespace, call),
            )
            .await;
            return match result {
                Err(EngineError::Store { reason }) => {
                    warn!(tool = %call.name, error = %reason, "memory store failed during tool call");
                    Ok(ToolOutcome::failed(reason))
                }
                other => other,
            };
        }

        guarded(
            cancel,
            self.call_timeout(),
            "tool call",
            self.tools.execute(&call.name, &definition, &call.arguments),
        )
        .await
    }

    async fn run_internal(&self, namespace: &str, call: &ToolCall) -> EngineResult<ToolOutcome> {
        let args = &call.arguments;
        match call.name.as_str() {
            KB_SEARCH | KB_OPEN => Ok(ToolOutcome {
                success: false,
                output: json!({ "status": "not_implemented", "tool": call.name }),
                error: Some(format!("{} is not implemented", call.name)),
                metadata: None,
            }),
            NOTES_READ => {
                let Some(key) = args.get("key").and_then(Value::as_str) else {
                    return Ok(ToolOutcome::failed("missing required argument 'key'"));
                };
                let value = self.memory.get_long_term_memory(namespace, key).await?;
                Ok(ToolOutcome::ok(json!({
                    "key": key,
                    "found": value.is_some(),
                    "value": value.unwrap_or(Value::Null),
                })))
            }
            NOTES_WRITE => {
                let Some(key) = args.get("key").and_then(Value::as_str) else {
                    return Ok(ToolOutcome::failed("missing required argument 'key'"));
                };
                let Some(value) = args.get("value") else {
                    return Ok(ToolOutcome::failed("missing required argument 'value'"));
                };
                let ttl = args
                    .get("ttl_seconds")
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs);
                self.memory
                    .set_long_term_memory(namespace, key, value.clone(), ttl)
                    .await?;
                Ok(ToolOutcome::ok(json!({ "key": key, "stored": true })))
            }
            other => Ok(ToolOutcome::failed(format!("unknown internal tool '{other}'"))),
        }
    }

    async fn append_run(&self, run: &Run) {
        match self.sink.append(run).await {
            Ok(()) => debug!(run_id = %run.id, status = ?run.status, "run appended"),
            Err(error) => warn!(run_id = %run.id, error = %error, "failed to append run"),
        }
    }
}

fn sync_session(session: &mut SessionState, machine: &StateMachine) {
    session.current_state = machine.current_state_id().to_string();
    session.state_entered_at = machine.entered_at();
}

/// The trailing `size` messages of `history`, extended backwards so the
/// window never opens on a tool result whose assistant turn was cut off.
pub fn history_window(history: &[ChatMessage], size: usize) -> &[ChatMessage] {
    let mut start = history.len().saturating_sub(size);
    while start > 0 && start < history.len() && history[start].is_tool_result() {
        start -= 1;
    }
    &history[start..]
}
