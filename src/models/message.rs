use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{normalize, ContentPart};
use super::role::Role;
use super::tool::ToolCallRequest;
use crate::errors::ChatResult;

/// A message to or from the model.
///
/// The engine appends messages to the caller's history and never removes or
/// reorders existing entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Message::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Message::new(Role::Assistant)
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Message::new(Role::System)
    }

    /// Create a tool-role message answering one tool call.
    pub fn tool<I, C>(tool_call_id: I, content: C) -> Self
    where
        I: Into<String>,
        C: Into<String>,
    {
        let mut message = Message::new(Role::Tool);
        message.tool_call_id = Some(tool_call_id.into());
        message.content.push(ContentPart::text(content));
        message
    }

    /// Add any content part to the message
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.content.push(part);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_part(ContentPart::text(text))
    }

    /// Add caller-supplied content in its loose JSON form, normalizing it.
    pub fn with_json_content(mut self, content: &Value) -> ChatResult<Self> {
        self.content.extend(normalize(content)?);
        Ok(self)
    }

    /// Record the tool calls this assistant message carries.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    /// Concatenation of all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}
