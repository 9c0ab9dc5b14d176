//! Callable tools and the invoker that runs the calls a model asks for.

pub mod http;
pub mod search;
pub mod text;

pub use http::{HttpError, post_json};
pub use search::{SearchBackend, SearchHit, SearchTool, TavilyClient, format_hits};
pub use text::{log_preview, truncate_with_ellipsis};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::message::{Message, ToolCall};

/// Prefix of every tool-result message produced from a failed call.
pub const TOOL_ERROR_PREFIX: &str = "(Error during tool call)";

/// Name, description and JSON-schema parameters a model sees for a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A capability the model can call: structured arguments in, text out.
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    fn call(&self, arguments: &Value) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error("no tool named '{0}' is registered")]
    UnknownTool(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Short category shown to the model alongside the detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::UnknownTool(_) => "UnknownTool",
            Self::Http(_) => "HttpError",
            Self::Failed(_) => "ToolFailed",
        }
    }

    /// The text a failed call turns into, so the model can react to it.
    pub fn diagnostic(&self) -> String {
        format!("{TOOL_ERROR_PREFIX} {}: {}", self.kind(), self)
    }
}

/// The set of tools bound to a tool-bearing step.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later tool with the same name shadows an earlier one.
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        let name = tool.spec().name;
        self.tools.retain(|t| t.spec().name != name);
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executes requested tool calls and turns each result into a tool message.
///
/// Tool failures never propagate: they become diagnostic tool messages so the
/// model sees them and the run carries on.
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call in request order; one message per call.
    pub fn run(&self, calls: &[ToolCall]) -> Vec<Message> {
        calls.iter().map(|call| self.run_one(call)).collect()
    }

    fn run_one(&self, call: &ToolCall) -> Message {
        let result = match self.registry.get(&call.name) {
            Some(tool) => tool.call(&call.arguments),
            None => Err(ToolError::UnknownTool(call.name.clone())),
        };

        match result {
            Ok(text) => {
                tracing::debug!(
                    tool = %call.name,
                    call_id = %call.id,
                    output = %log_preview(&text, 300),
                    "tool call finished"
                );
                Message::tool(&call.id, text)
            }
            Err(err) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    kind = err.kind(),
                    error = %err,
                    "tool call failed"
                );
                Message::tool(&call.id, err.diagnostic())
            }
        }
    }
}
