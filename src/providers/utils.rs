use regex::Regex;
use serde_json::{json, Value};

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCallRequest};

use super::base::Completion;

/// Convert one internal message to the wire shape the endpoint expects.
pub fn message_to_wire(message: &Message) -> Value {
    let content: Vec<Value> = message.content.iter().map(|part| part.to_wire()).collect();
    let mut converted = json!({
        "role": message.role,
        "content": content,
    });

    if let Some(calls) = &message.tool_calls {
        let wire_calls: Vec<Value> = calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&call.name),
                        "arguments": call.arguments,
                    }
                })
            })
            .collect();
        converted["tool_calls"] = json!(wire_calls);
    }
    if let Some(id) = &message.tool_call_id {
        converted["tool_call_id"] = json!(id);
    }

    converted
}

pub fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(message_to_wire).collect()
}

/// Convert tool definitions to the endpoint's function-tool specification.
pub fn tools_to_wire(tools: &[Tool]) -> ChatResult<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !seen.insert(&tool.name) {
            return Err(ChatError::Validation {
                parameter: "tools",
                reason: format!("duplicate tool name: {}", tool.name),
            });
        }
        result.push(json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Parse a completed (non-streamed) response body.
///
/// Tool-call arguments stay as raw JSON text here; the interpreter parses
/// them so one malformed payload fails only that call.
pub fn response_to_completion(response: &Value) -> ChatResult<Completion> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ChatError::Transport(format!("response has no choices: {response}")))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);
    let reasoning = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let name = call["function"]["name"].as_str().unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(ToolCallRequest::generated_id);
            let arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
            tool_calls.push(ToolCallRequest::new(id, name, arguments));
        }
    }

    let logprobs = response["choices"][0]
        .get("logprobs")
        .filter(|value| !value.is_null())
        .cloned();

    Ok(Completion {
        content,
        reasoning,
        tool_calls,
        logprobs,
    })
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}
