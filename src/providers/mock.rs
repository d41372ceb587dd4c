use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::errors::{ChatError, ChatResult};

use super::base::{Completion, CompletionRequest, EventStream, Provider, StreamEvent};

/// A scripted provider returning pre-configured responses for testing.
///
/// Requests are recorded so tests can assert on attempt counts and payloads.
#[derive(Default)]
pub struct MockProvider {
    completions: Mutex<VecDeque<ChatResult<Completion>>>,
    streams: Mutex<VecDeque<Vec<ChatResult<StreamEvent>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that answers successive `complete` calls in order.
    pub fn completing(responses: Vec<ChatResult<Completion>>) -> Self {
        let provider = Self::new();
        *provider.completions.lock().unwrap() = responses.into();
        provider
    }

    /// Queue one streamed response script.
    pub fn push_stream(&self, script: Vec<ChatResult<StreamEvent>>) {
        self.streams.lock().unwrap().push_back(script);
    }

    /// Queue one non-streaming response.
    pub fn push_completion(&self, response: ChatResult<Completion>) {
        self.completions.lock().unwrap().push_back(response);
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::Transport("no scripted completion".into())))
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<EventStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Transport("no scripted stream".into()))?;
        Ok(Box::pin(stream::iter(script)))
    }
}
