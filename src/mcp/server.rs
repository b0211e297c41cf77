//! MCP server core
//!
//! Binds method handlers to the streamable HTTP transport. The same
//! core runs on both tiers: the bridge plugs in its local tool host,
//! the gateway plugs in the upstream router.

use crate::Result;
use crate::constants::SWEEP_INTERVAL_SECS;
use crate::mcp::protocol::{
    CallToolParams, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ServerIdentity,
};
use crate::mcp::session::{McpSession, SessionTable};
use crate::model::{ToolCallResult, ToolDescriptor};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Status answered for a request carrying an unknown session id.
///
/// The bridge answers 404, the gateway stays on 400 for compatibility
/// with deployed clients; each deployment picks one and keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownSessionPolicy {
    NotFound,
    BadRequest,
}

impl UnknownSessionPolicy {
    pub fn status(self) -> StatusCode {
        match self {
            UnknownSessionPolicy::NotFound => StatusCode::NOT_FOUND,
            UnknownSessionPolicy::BadRequest => StatusCode::BAD_REQUEST,
        }
    }
}

/// Method handlers behind the transport
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// Serve `tools/list` for a session
    async fn tools_list(&self, session: &Arc<McpSession>) -> Result<Vec<ToolDescriptor>>;

    /// Serve `tools/call` for a session
    async fn tools_call(
        &self,
        session: &Arc<McpSession>,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult>;

    /// Called after a session leaves the table (DELETE, close, idle
    /// sweep) so the handler can release per-session state.
    async fn session_closed(&self, _session: &Arc<McpSession>) {}
}

/// Transport-facing server state shared by all `/mcp` handlers
pub struct McpServerCore {
    identity: ServerIdentity,
    pub sessions: Arc<SessionTable>,
    handler: Arc<dyn McpHandler>,
    unknown_session: UnknownSessionPolicy,
}

impl McpServerCore {
    pub fn new(
        identity: ServerIdentity,
        sessions: Arc<SessionTable>,
        handler: Arc<dyn McpHandler>,
        unknown_session: UnknownSessionPolicy,
    ) -> Self {
        Self {
            identity,
            sessions,
            handler,
            unknown_session,
        }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn unknown_session_status(&self) -> StatusCode {
        self.unknown_session.status()
    }

    /// Dispatch one JSON-RPC request on an established session.
    ///
    /// `initialize` created the session, so a second one here is a
    /// protocol error; everything else routes to the bound handler.
    pub async fn dispatch(
        &self,
        session: &Arc<McpSession>,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => JsonRpcResponse::error(
                id,
                JsonRpcError::session_error("Session already initialized"),
            ),
            "tools/list" => match self.handler.tools_list(session).await {
                Ok(tools) => JsonRpcResponse::success(id, json!({"tools": tools})),
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "tools/list failed");
                    JsonRpcResponse::error(id, JsonRpcError::session_error(e.to_string()))
                }
            },
            "tools/call" => {
                let params: CallToolParams = match request
                    .params
                    .map(serde_json::from_value)
                    .transpose()
                {
                    Ok(Some(params)) => params,
                    Ok(None) => {
                        return JsonRpcResponse::error(
                            id,
                            JsonRpcError::new(
                                crate::constants::JSONRPC_INVALID_REQUEST,
                                "tools/call requires params",
                            ),
                        );
                    }
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            JsonRpcError::new(
                                crate::constants::JSONRPC_INVALID_REQUEST,
                                format!("Invalid tools/call params: {}", e),
                            ),
                        );
                    }
                };

                let arguments = params.arguments.unwrap_or_default();
                match self
                    .handler
                    .tools_call(session, &params.name, arguments)
                    .await
                {
                    // Tool failures stay in-band; the envelope is a success
                    Ok(result) => match serde_json::to_value(&result) {
                        Ok(value) => JsonRpcResponse::success(id, value),
                        Err(e) => JsonRpcResponse::error(
                            id,
                            JsonRpcError::session_error(format!("Unencodable tool result: {}", e)),
                        ),
                    },
                    Err(e) => {
                        tracing::warn!(session = %session.id, tool = %params.name, error = %e, "tools/call failed");
                        JsonRpcResponse::error(id, JsonRpcError::session_error(e.to_string()))
                    }
                }
            }
            other => JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
        }
    }

    /// Remove a session and run the handler's close hook
    pub async fn close_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some(session) => {
                self.handler.session_closed(&session).await;
                true
            }
            None => false,
        }
    }

    /// Emit `tools/list_changed` to every open session
    pub fn notify_tools_changed(&self) {
        self.sessions
            .broadcast(&JsonRpcNotification::tools_list_changed());
    }

    /// Emit `tools/list_changed` to one user's open sessions
    pub fn notify_tools_changed_for_user(&self, user_id: &str) {
        self.sessions
            .broadcast_for_user(user_id, &JsonRpcNotification::tools_list_changed());
    }

    /// Periodically drop idle sessions and run their close hooks
    pub fn spawn_idle_sweeper(core: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                for session in core.sessions.sweep() {
                    tracing::debug!(session = %session.id, "idle session expired");
                    core.handler.session_closed(&session).await;
                }
            }
        })
    }
}
