use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::errors::ChatResult;
use crate::models::tool::{Tool, ToolCallRequest};
use crate::params::RequestParameters;

/// A fully assembled request, ready for the transport layer.
///
/// Messages are already in wire form; the provider adds its own model name
/// and stream flag when it builds the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Value>,
    pub tools: Vec<Tool>,
    pub params: RequestParameters,
}

/// One completed assistant response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub logprobs: Option<Value>,
}

impl Completion {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Completion {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_reasoning<S: Into<String>>(mut self, reasoning: S) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = calls;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Other(String),
}

impl From<&str> for FinishReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Model-internal explanation text, surfaced but never persisted.
    Reasoning(String),
    Content(String),
    /// Partial tool call. One call's arguments may arrive over several
    /// fragments sharing an index; id and name are only present on the first.
    ToolCallFragment {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Finished(FinishReason),
}

pub type EventStream = BoxStream<'static, ChatResult<StreamEvent>>;

/// Transport contract for a completion endpoint.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Issue the request once and return the completed message.
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<Completion>;

    /// Issue the request in streaming mode.
    async fn stream(&self, request: &CompletionRequest) -> ChatResult<EventStream>;
}
