use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};

use crate::errors::{ChatError, ChatResult};
use crate::events::{EventSink, TracingSink};

use super::base::{
    Completion, CompletionRequest, EventStream, FinishReason, Provider, StreamEvent,
};
use super::sse::SseDecoder;
use super::utils::{response_to_completion, tools_to_wire};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn new<H, K, M>(host: H, api_key: K, model: M) -> Self
    where
        H: Into<String>,
        K: Into<String>,
        M: Into<String>,
    {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Read the configuration from `PLOVER_API_KEY`, `PLOVER_HOST` and
    /// `PLOVER_MODEL`. Only the key is required.
    pub fn from_env() -> ChatResult<Self> {
        let api_key = env::var("PLOVER_API_KEY").map_err(|_| ChatError::Validation {
            parameter: "api_key",
            reason: "PLOVER_API_KEY must be set".into(),
        })?;
        let host =
            env::var("PLOVER_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let model = env::var("PLOVER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new(host, api_key, model))
    }
}

/// Transport client for an OpenAI-compatible completion endpoint.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    sink: Arc<dyn EventSink>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            sink: Arc::new(TracingSink),
        })
    }

    /// Replace the default tracing sink. Advisory warnings from the file
    /// collaborators are reported through it.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    fn payload(&self, request: &CompletionRequest, stream: bool) -> ChatResult<Value> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert("messages".to_string(), json!(request.messages));
        payload.insert("stream".to_string(), json!(stream));
        request.params.apply_to(&mut payload);

        if !request.tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_wire(&request.tools)?));
        }

        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: &Value) -> ChatResult<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(ChatError::Transport(format!("server error: {status}")))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ChatError::Transport(format!(
                    "request failed: {status}: {body}"
                )))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<Completion> {
        let payload = self.payload(request, false)?;
        let body: Value = self.post(&payload).await?.json().await?;

        if let Some(error) = body.get("error") {
            return Err(ChatError::Transport(format!("API error: {error}")));
        }

        response_to_completion(&body)
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<EventStream> {
        let payload = self.payload(request, true)?;
        let response = self.post(&payload).await?;
        let mut bytes = response.bytes_stream();

        Ok(Box::pin(try_stream! {
            let mut decoder = SseDecoder::new();
            let mut done = false;

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| ChatError::Transport(e.to_string()))?;
                for payload in decoder.feed(&String::from_utf8_lossy(&chunk)) {
                    if payload == "[DONE]" {
                        done = true;
                        break 'read;
                    }
                    for event in chunk_to_events(&payload)? {
                        yield event;
                    }
                }
            }

            if !done {
                if let Some(payload) = decoder.finish() {
                    if payload != "[DONE]" {
                        for event in chunk_to_events(&payload)? {
                            yield event;
                        }
                    }
                }
            }
        }))
    }
}

/// Decode one streamed chunk body into typed events.
fn chunk_to_events(payload: &str) -> ChatResult<Vec<StreamEvent>> {
    let chunk: Value = serde_json::from_str(payload)
        .map_err(|e| ChatError::Transport(format!("undecodable stream chunk: {e}")))?;

    let Some(choice) = chunk.get("choices").and_then(|choices| choices.get(0)) else {
        return Ok(Vec::new());
    };
    let delta = &choice["delta"];
    let mut events = Vec::new();

    if let Some(reasoning) = delta.get("reasoning_content").and_then(Value::as_str) {
        if !reasoning.is_empty() {
            events.push(StreamEvent::Reasoning(reasoning.to_string()));
        }
    }
    if let Some(content) = delta.get("content").and_then(Value::as_str) {
        if !content.is_empty() {
            events.push(StreamEvent::Content(content.to_string()));
        }
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            events.push(StreamEvent::ToolCallFragment {
                index: call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize,
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
                name: call["function"]["name"]
                    .as_str()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                arguments: call["function"]["arguments"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }
    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        events.push(StreamEvent::Finished(FinishReason::from(reason)));
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RequestParameters;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_with(messages: Vec<Value>) -> CompletionRequest {
        CompletionRequest {
            messages,
            tools: Vec::new(),
            params: RequestParameters::default(),
        }
    }

    async fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig::new(server.uri(), "test-key", "test-model")).unwrap()
    }

    #[tokio::test]
    async fn complete_returns_the_assistant_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "test-model", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello there."},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let request = request_with(vec![json!({"role": "user", "content": "hi"})]);
        let completion = provider.complete(&request).await.unwrap();
        assert_eq!(completion.content.as_deref(), Some("Hello there."));
    }

    #[tokio::test]
    async fn server_errors_surface_as_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .complete(&request_with(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn api_error_bodies_surface_as_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": "model_not_found", "message": "no such model"}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let err = provider
            .complete(&request_with(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn tools_are_attached_only_when_present() {
        let server = MockServer::start().await;
        let provider = provider_for(&server).await;

        let mut request = request_with(vec![]);
        let payload = provider.payload(&request, false).unwrap();
        assert!(payload.get("tools").is_none());

        request.tools = vec![crate::models::tool::Tool::bare("get_time")];
        let payload = provider.payload(&request, true).unwrap();
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["tools"][0]["function"]["name"], "get_time");
    }

    #[tokio::test]
    async fn stream_yields_typed_events() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let request = request_with(vec![json!({"role": "user", "content": "hi"})]);
        let mut stream = provider.stream(&request).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::Reasoning("hmm".into()),
                StreamEvent::Content("Par".into()),
                StreamEvent::Content("is".into()),
                StreamEvent::Finished(FinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn stream_decodes_tool_call_fragments() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"{\\\"loc\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"ation\\\":\\\"Paris\\\"}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let mut stream = provider
            .stream(&request_with(vec![json!({"role": "user", "content": "?"})]))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallFragment {
                    index: 0,
                    id: Some("call_1".into()),
                    name: Some("get_weather".into()),
                    arguments: "{\"loc".into(),
                },
                StreamEvent::ToolCallFragment {
                    index: 0,
                    id: None,
                    name: None,
                    arguments: "ation\":\"Paris\"}".into(),
                },
                StreamEvent::Finished(FinishReason::ToolCalls),
            ]
        );
    }
}
