use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// A tool definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema for the parameters the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name, description and schema.
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// A tool with no declared schema: the description falls back to
    /// `call <name>` and the parameters to a single opaque string argument.
    pub fn bare<N: Into<String>>(name: N) -> Self {
        let name = name.into();
        let description = format!("call {name}");
        Tool {
            name,
            description,
            parameters: fallback_parameters(),
        }
    }
}

/// Schema used when a tool is registered without one.
pub fn fallback_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "arg": {"type": "string"}
        },
        "required": ["arg"],
        "additionalProperties": false
    })
}

/// A tool invocation requested by the model.
///
/// `arguments` is kept as raw JSON text; the interpreter parses it so a
/// malformed payload fails that one call instead of the whole turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Id used when the transport omits one.
    pub fn generated_id() -> String {
        format!("call_{}", Uuid::new_v4())
    }
}

/// The outcome of one tool invocation, always produced, in request order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    /// JSON text: the tool's return value or an `{"error": ...}` envelope.
    pub content: String,
}
