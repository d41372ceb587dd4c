use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::errors::{ChatError, ChatResult};
use crate::events::{ChatEvent, EventSink, TracingSink};
use crate::models::message::Message;
use crate::models::tool::{ToolCallRequest, ToolResult};
use crate::params::{CancelToken, RequestParameters, RetryPolicy};
use crate::providers::base::{Completion, CompletionRequest, FinishReason, Provider, StreamEvent};
use crate::providers::openai::{OpenAiConfig, OpenAiProvider};
use crate::providers::utils::{message_to_wire, messages_to_wire};
use crate::registry::ToolRegistry;

/// Content recorded for the assistant message that carries tool calls.
const TOOL_CALLS_PLACEHOLDER: &str = "Tool calls executed";

/// One piece of a turn's output.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Assistant content; persisted to history.
    Content(String),
    /// Model-internal explanation; surfaced but never persisted.
    Reasoning(String),
}

impl Fragment {
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Fragment::Content(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_reasoning(&self) -> Option<&str> {
        match self {
            Fragment::Reasoning(text) => Some(text),
            _ => None,
        }
    }
}

/// Options for one turn.
#[derive(Default)]
pub struct ChatOptions {
    pub stream: bool,
    pub tools: Option<ToolRegistry>,
    /// Rendered as a leading system wire message, never written to history.
    pub system_instruction: Option<String>,
    pub params: RequestParameters,
    pub cancel: CancelToken,
}

impl ChatOptions {
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_params(mut self, params: RequestParameters) -> Self {
        self.params = params;
        self
    }
}

pub type FragmentStream<'a> = BoxStream<'a, ChatResult<Fragment>>;

/// The turn controller.
///
/// Owns the transport provider and the observability sink; holds no
/// conversation state of its own. Each `chat` call mutates the caller's
/// history exactly once per accepted turn, append-only.
pub struct ChatClient {
    provider: Arc<dyn Provider>,
    sink: Arc<dyn EventSink>,
    closed: AtomicBool,
}

impl ChatClient {
    /// Connect to an OpenAI-compatible endpoint. The client and its provider
    /// share one sink, so file-collaborator warnings surface alongside
    /// engine events.
    pub fn open(config: OpenAiConfig) -> ChatResult<Self> {
        let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
        let provider = Arc::new(OpenAiProvider::new(config)?.with_sink(sink.clone()));
        Ok(Self {
            provider,
            sink,
            closed: AtomicBool::new(false),
        })
    }

    /// Build a client over any transport implementation.
    pub fn with_provider(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            sink: Arc::new(TracingSink),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the default tracing sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Mark the client closed; subsequent calls fail with `ChatError::Closed`.
    ///
    /// Returns true the first time only. Transport resources are released
    /// when the client is dropped, on every path.
    pub fn shutdown(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Run one turn over the caller's history.
    ///
    /// Validation happens before anything is sent; the returned stream lazily
    /// yields content and reasoning fragments while appending the turn's
    /// assistant and tool messages to `history` in place.
    pub fn chat<'a>(
        &'a self,
        history: &'a mut Vec<Message>,
        options: ChatOptions,
    ) -> ChatResult<FragmentStream<'a>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::Closed);
        }
        options.params.validate()?;

        let ChatOptions {
            stream: streaming,
            tools,
            system_instruction,
            params,
            cancel,
        } = options;
        let registry = tools.unwrap_or_default();
        let tool_specs = registry.specs();

        // Wire-level view of the conversation. The system instruction is
        // request-scoped: it leads the wire messages but stays out of the
        // caller's history.
        let mut wire: Vec<Value> = Vec::with_capacity(history.len() + 1);
        if let Some(instruction) = &system_instruction {
            wire.push(message_to_wire(&Message::system().with_text(instruction)));
        }
        wire.extend(messages_to_wire(history));

        Ok(Box::pin(try_stream! {
            ensure_live(&cancel)?;
            let request = CompletionRequest {
                messages: wire.clone(),
                tools: tool_specs,
                params: params.clone(),
            };
            self.sink.emit(&ChatEvent::RequestStarted { streaming });

            if streaming {
                let mut events = self.provider.stream(&request).await?;
                let mut content = String::new();
                let mut pending: Vec<PendingCall> = Vec::new();

                while let Some(event) = events.next().await {
                    match event? {
                        StreamEvent::Reasoning(text) => {
                            yield Fragment::Reasoning(text);
                        }
                        StreamEvent::Content(text) => {
                            content.push_str(&text);
                            yield Fragment::Content(text);
                        }
                        StreamEvent::ToolCallFragment { index, id, name, arguments } => {
                            buffer_fragment(&mut pending, index, id, name, arguments);
                        }
                        StreamEvent::Finished(FinishReason::ToolCalls) => {
                            let calls = assemble_calls(std::mem::take(&mut pending), self.sink.as_ref());
                            if !calls.is_empty() {
                                let fragments = self
                                    .resolve_tool_round(&registry, calls, &mut wire, history, &params, &cancel)
                                    .await;
                                for fragment in fragments {
                                    yield fragment;
                                }
                            }
                            break;
                        }
                        StreamEvent::Finished(reason) => {
                            let persist = matches!(reason, FinishReason::Stop | FinishReason::Length);
                            if persist && !content.is_empty() {
                                history.push(Message::assistant().with_text(content.clone()));
                            }
                            break;
                        }
                    }
                }
            } else {
                let completion = self
                    .execute_with_retry(&request, &params.retry, &cancel)
                    .await?;
                if let Some(logprobs) = &completion.logprobs {
                    self.sink.emit(&ChatEvent::LogprobsReceived {
                        logprobs: logprobs.clone(),
                    });
                }

                if completion.tool_calls.is_empty() {
                    let text = completion.content.unwrap_or_default();
                    history.push(Message::assistant().with_text(text.clone()));
                    if let Some(reasoning) = completion.reasoning {
                        yield Fragment::Reasoning(reasoning);
                    }
                    if !text.is_empty() {
                        yield Fragment::Content(text);
                    }
                } else {
                    let fragments = self
                        .resolve_tool_round(
                            &registry,
                            completion.tool_calls,
                            &mut wire,
                            history,
                            &params,
                            &cancel,
                        )
                        .await;
                    for fragment in fragments {
                        yield fragment;
                    }
                }
            }
        }))
    }

    /// Non-streaming execution with bounded retry and backoff.
    async fn execute_with_retry(
        &self,
        request: &CompletionRequest,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> ChatResult<Completion> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 0..attempts {
            ensure_live(cancel)?;
            match self.provider.complete(request).await {
                Ok(completion) => return Ok(completion),
                Err(error) => {
                    if attempt + 1 == attempts {
                        return Err(error);
                    }
                    let delay = policy.delay_for(attempt);
                    self.sink.emit(&ChatEvent::RetryScheduled {
                        attempt,
                        delay,
                        error: error.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(ChatError::Transport("retry budget exhausted".into()))
    }

    /// Execute the detected tool calls, append the round's messages, and
    /// issue the tool-free follow-up request.
    ///
    /// A follow-up failure is downgraded: the caller sees an inline error
    /// fragment and history records an assistant error message, so the
    /// conversation stays inspectable. Tool calls in the follow-up response
    /// are not re-executed.
    async fn resolve_tool_round(
        &self,
        registry: &ToolRegistry,
        calls: Vec<ToolCallRequest>,
        wire: &mut Vec<Value>,
        history: &mut Vec<Message>,
        params: &RequestParameters,
        cancel: &CancelToken,
    ) -> Vec<Fragment> {
        let assistant = Message::assistant()
            .with_text(TOOL_CALLS_PLACEHOLDER)
            .with_tool_calls(calls.clone());
        wire.push(message_to_wire(&assistant));
        history.push(assistant);

        for result in execute_tool_calls(registry, &calls, self.sink.as_ref()).await {
            let message = Message::tool(result.tool_call_id, result.content);
            wire.push(message_to_wire(&message));
            history.push(message);
        }

        let follow_up = CompletionRequest {
            messages: wire.clone(),
            tools: Vec::new(),
            params: params.clone(),
        };
        match self.execute_with_retry(&follow_up, &params.retry, cancel).await {
            Ok(completion) => {
                let text = completion.content.unwrap_or_default();
                history.push(Message::assistant().with_text(text.clone()));
                let mut fragments = Vec::new();
                if let Some(reasoning) = completion.reasoning {
                    fragments.push(Fragment::Reasoning(reasoning));
                }
                if !text.is_empty() {
                    fragments.push(Fragment::Content(text));
                }
                fragments
            }
            Err(error) => {
                self.sink.emit(&ChatEvent::FinalRequestFailed {
                    error: error.to_string(),
                });
                let text = format!("Error: could not obtain the final response: {error}");
                history.push(Message::assistant().with_text(text.clone()));
                vec![Fragment::Content(text)]
            }
        }
    }
}

fn ensure_live(cancel: &CancelToken) -> ChatResult<()> {
    if cancel.is_cancelled() {
        return Err(ChatError::Cancelled);
    }
    Ok(())
}

/// A tool call under assembly from stream fragments, keyed by index.
struct PendingCall {
    index: usize,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

fn buffer_fragment(
    pending: &mut Vec<PendingCall>,
    index: usize,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
) {
    if let Some(entry) = pending.iter_mut().find(|call| call.index == index) {
        if entry.id.is_none() {
            entry.id = id;
        }
        if entry.name.is_none() {
            entry.name = name;
        }
        entry.arguments.push_str(&arguments);
    } else {
        pending.push(PendingCall {
            index,
            id,
            name,
            arguments,
        });
    }
}

/// Finalize buffered calls once the stream has signalled completion.
///
/// Arguments are parsed exactly once per call here; a call whose payload
/// never became well-formed JSON is dropped with a warning instead of
/// aborting the turn.
fn assemble_calls(mut pending: Vec<PendingCall>, sink: &dyn EventSink) -> Vec<ToolCallRequest> {
    pending.sort_by_key(|call| call.index);
    let mut calls = Vec::new();

    for call in pending {
        let id = call.id.unwrap_or_else(ToolCallRequest::generated_id);
        let Some(name) = call.name else {
            sink.emit(&ChatEvent::ToolCallDiscarded {
                id,
                name: String::new(),
                reason: "missing tool name".into(),
            });
            continue;
        };
        let arguments = if call.arguments.is_empty() {
            "{}".to_string()
        } else {
            call.arguments
        };
        if let Err(error) = serde_json::from_str::<Value>(&arguments) {
            sink.emit(&ChatEvent::ToolCallDiscarded {
                id,
                name,
                reason: error.to_string(),
            });
            continue;
        }
        calls.push(ToolCallRequest::new(id, name, arguments));
    }

    calls
}

/// The tool-call interpreter.
///
/// Every request yields exactly one result, in request order: parse
/// failures, unknown tools and handler errors all become `{"error": ...}`
/// envelopes rather than turn failures.
pub async fn execute_tool_calls(
    registry: &ToolRegistry,
    calls: &[ToolCallRequest],
    sink: &dyn EventSink,
) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());

    for call in calls {
        sink.emit(&ChatEvent::ToolCallStarted {
            id: call.id.clone(),
            name: call.name.clone(),
        });
        let outcome = invoke(registry, call).await;
        sink.emit(&ChatEvent::ToolCallFinished {
            id: call.id.clone(),
            ok: outcome.is_ok(),
        });
        let content = match outcome {
            Ok(value) => value.to_string(),
            Err(message) => json!({ "error": message }).to_string(),
        };
        results.push(ToolResult {
            tool_call_id: call.id.clone(),
            content,
        });
    }

    results
}

async fn invoke(registry: &ToolRegistry, call: &ToolCallRequest) -> Result<Value, String> {
    let arguments: Value = serde_json::from_str(&call.arguments)
        .map_err(|e| format!("invalid arguments for {}: {e}", call.name))?;
    if !arguments.is_object() {
        return Err(format!("arguments for {} must be a JSON object", call.name));
    }
    let Some(handler) = registry.get(&call.name) else {
        return Err(format!("tool not found: {}", call.name));
    };
    handler.call(arguments).await.map_err(|e| e.to_string())
}
