use std::time::Duration;

use serde_json::Value;

/// Structured events emitted while a turn is in flight.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    RequestStarted {
        streaming: bool,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    ToolCallStarted {
        id: String,
        name: String,
    },
    ToolCallFinished {
        id: String,
        ok: bool,
    },
    /// A streamed tool call was dropped because its buffered arguments never
    /// became well-formed JSON. The stream itself continues.
    ToolCallDiscarded {
        id: String,
        name: String,
        reason: String,
    },
    LogprobsReceived {
        logprobs: Value,
    },
    FinalRequestFailed {
        error: String,
    },
    FileUploaded {
        path: String,
        file_id: String,
    },
    /// An upload's detected MIME type is outside the supported allowlist.
    /// The upload still proceeds; the remote side may accept it.
    UploadMimeUnlisted {
        path: String,
        mime_type: String,
    },
    /// An inline image's detected type was unusable and the jpeg fallback
    /// was applied.
    InlineImageFallback {
        path: String,
        mime_type: String,
    },
}

/// Observer for engine events, owned by the client instance.
///
/// There is no process-wide logger: callers inject a sink at construction and
/// it lives exactly as long as the client does.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ChatEvent);
}

/// Default sink forwarding events to `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ChatEvent) {
        match event {
            ChatEvent::RequestStarted { streaming } => {
                tracing::debug!(streaming, "completion request started");
            }
            ChatEvent::RetryScheduled {
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(attempt, ?delay, %error, "request failed, retry scheduled");
            }
            ChatEvent::ToolCallStarted { id, name } => {
                tracing::info!(%id, %name, "executing tool call");
            }
            ChatEvent::ToolCallFinished { id, ok } => {
                tracing::info!(%id, ok, "tool call finished");
            }
            ChatEvent::ToolCallDiscarded { id, name, reason } => {
                tracing::warn!(%id, %name, %reason, "discarding malformed tool call");
            }
            ChatEvent::LogprobsReceived { logprobs } => {
                tracing::debug!(%logprobs, "logprobs received");
            }
            ChatEvent::FinalRequestFailed { error } => {
                tracing::error!(%error, "final request after tool round failed");
            }
            ChatEvent::FileUploaded { path, file_id } => {
                tracing::info!(%path, %file_id, "file uploaded");
            }
            ChatEvent::UploadMimeUnlisted { path, mime_type } => {
                tracing::warn!(%path, %mime_type, "MIME type may not be supported");
            }
            ChatEvent::InlineImageFallback { path, mime_type } => {
                tracing::warn!(%path, %mime_type, "not an inline image type, defaulting to image/jpeg");
            }
        }
    }
}
