//! Tool executor
//!
//! Dispatches named tool invocations to their handlers with an
//! explicit host context, enforces per-session preconditions, and
//! normalises handler results into the wire form. Tool execution
//! failures are in-band (`isError`), never transport errors.

use super::ToolRegistry;
use crate::Result;
use crate::model::{ToolCallResult, ToolContent};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Tool ordering rules: (tool, required prior tool, failure message).
///
/// The flag is set on any successful call of the required tool and
/// never cleared within a session.
const TOOL_PRECONDITIONS: &[(&str, &str, &str)] = &[(
    "edit_note",
    "read_note",
    "read_note must be called before edit_note",
)];

/// Explicit context passed to every tool handler.
///
/// Replaces the original host's dynamically injected globals; handlers
/// receive per-call identity here and own their vault handles.
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    /// MCP session the call arrived on, when there is one
    pub session_id: Option<String>,

    /// Authenticated user (gateway-routed calls only)
    pub user: Option<String>,
}

/// Raw output of a tool handler before normalisation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }
}

/// A tool implementation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>, context: &HostContext)
    -> Result<ToolOutput>;
}

/// Wrap an async closure as a tool handler
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for HandlerFn<F>
where
    F: Fn(Map<String, Value>, HostContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<ToolOutput>> + Send,
{
    async fn call(
        &self,
        arguments: Map<String, Value>,
        context: &HostContext,
    ) -> Result<ToolOutput> {
        (self.0)(arguments, context.clone()).await
    }
}

/// Build a shareable handler from an async closure; the function-call
/// site pins the closure signature down for inference.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>, HostContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolOutput>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Per-session record of satisfied tool prerequisites
pub trait PreconditionState: Send + Sync {
    fn satisfied(&self, tool: &str) -> bool;
    fn satisfy(&self, tool: &str);
}

/// Standalone precondition set for sessionless surfaces (bridge v1)
#[derive(Default)]
pub struct SharedPreconditions {
    satisfied: RwLock<HashSet<String>>,
}

impl PreconditionState for SharedPreconditions {
    fn satisfied(&self, tool: &str) -> bool {
        self.satisfied.read().contains(tool)
    }

    fn satisfy(&self, tool: &str) {
        self.satisfied.write().insert(tool.to_string());
    }
}

/// Dispatches tool invocations against a registry
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a named tool.
    ///
    /// Unknown tools, unmet preconditions and handler failures all
    /// come back as `isError` results; the surrounding HTTP exchange
    /// stays 200.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        context: &HostContext,
        preconditions: &dyn PreconditionState,
    ) -> ToolCallResult {
        let Some(tool) = self.registry.get(name) else {
            return ToolCallResult::error(format!("Error: Tool '{}' not found", name));
        };

        if let Some((_, required, message)) = TOOL_PRECONDITIONS
            .iter()
            .copied()
            .find(|(tool_name, _, _)| *tool_name == name)
            && !preconditions.satisfied(required)
        {
            return ToolCallResult::error(format!("Error: {}", message));
        }

        let output = match tool.handler.call(arguments, context).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool handler failed");
                return ToolCallResult::error(format!("Error: {}", e));
            }
        };

        let result = ToolCallResult {
            content: output.content.into_iter().map(normalize_content).collect(),
            is_error: output.is_error,
        };

        if !result.is_error {
            preconditions.satisfy(name);
        }
        result
    }
}

/// Unknown content variants are flattened to a text item carrying
/// their JSON form; known variants pass through untouched.
fn normalize_content(item: ToolContent) -> ToolContent {
    match item {
        ToolContent::Opaque(value) => ToolContent::text(value.to_string()),
        known => known,
    }
}
