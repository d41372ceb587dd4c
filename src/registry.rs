use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ChatError, ChatResult, ToolError};
use crate::models::tool::Tool;

/// A callable capability supplied by the caller for the duration of one
/// `chat` call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool with its parsed JSON arguments.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.f)(arguments).await
    }
}

#[derive(Clone)]
struct Entry {
    spec: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Ordered mapping of tool name to handler, read-only during a call.
///
/// Registration order is preserved in the definitions sent on the wire.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique within the registry.
    pub fn register<H>(&mut self, spec: Tool, handler: H) -> ChatResult<()>
    where
        H: ToolHandler + 'static,
    {
        if self.entries.iter().any(|entry| entry.spec.name == spec.name) {
            return Err(ChatError::Validation {
                parameter: "tools",
                reason: format!("duplicate tool name: {}", spec.name),
            });
        }
        self.entries.push(Entry {
            spec,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, spec: Tool, f: F) -> ChatResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(spec, FnHandler { f })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.entries
            .iter()
            .find(|entry| entry.spec.name == name)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Tool definitions in registration order.
    pub fn specs(&self) -> Vec<Tool> {
        self.entries.iter().map(|entry| entry.spec.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
