//! Plugin bridge (tier A)
//!
//! One loopback HTTP listener, two surfaces over one tool registry:
//! the MCP streamable HTTP endpoint at `/mcp` (optionally guarded by
//! a shared API key) and the legacy REST surface at `/bridge/v1/*`.

pub mod notes;
pub mod v1;

use crate::config::BridgeConfig;
use crate::constants::BRIDGE_API_KEY_HEADER;
use crate::mcp::protocol::ServerIdentity;
use crate::mcp::server::{McpHandler, McpServerCore, UnknownSessionPolicy};
use crate::mcp::session::{McpSession, SessionTable};
use crate::mcp::transport::mcp_routes;
use crate::model::{ToolCallResult, ToolDescriptor};
use crate::registry::executor::{HostContext, SharedPreconditions, ToolExecutor};
use crate::registry::ToolRegistry;
use crate::{NotegateError, Result};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

/// Local tool host: serves MCP methods straight from the registry
pub struct LocalToolHost {
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
}

#[async_trait]
impl McpHandler for LocalToolHost {
    async fn tools_list(&self, _session: &Arc<McpSession>) -> Result<Vec<ToolDescriptor>> {
        Ok(self.registry.list())
    }

    async fn tools_call(
        &self,
        session: &Arc<McpSession>,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult> {
        let context = HostContext {
            session_id: Some(session.id.clone()),
            user: session.user_id.clone(),
        };
        Ok(self
            .executor
            .execute(name, arguments, &context, session.as_ref())
            .await)
    }
}

/// Shared state behind both bridge surfaces
pub struct BridgeState {
    pub core: Arc<McpServerCore>,
    pub registry: Arc<ToolRegistry>,
    pub executor: Arc<ToolExecutor>,

    /// The legacy surface is sessionless; it runs against one
    /// bridge-lifetime precondition state.
    pub v1_preconditions: Arc<SharedPreconditions>,

    api_key: Option<String>,
}

/// Assemble bridge state over a populated registry
pub fn build_bridge(registry: Arc<ToolRegistry>, api_key: Option<String>) -> Arc<BridgeState> {
    let executor = Arc::new(ToolExecutor::new(registry.clone()));
    let host = Arc::new(LocalToolHost {
        registry: registry.clone(),
        executor: executor.clone(),
    });
    let core = Arc::new(McpServerCore::new(
        ServerIdentity::new("notegate-bridge"),
        Arc::new(SessionTable::new()),
        host,
        UnknownSessionPolicy::NotFound,
    ));

    Arc::new(BridgeState {
        core,
        registry,
        executor,
        v1_preconditions: Arc::new(SharedPreconditions::default()),
        api_key,
    })
}

/// Build the bridge router: `/mcp` plus `/bridge/v1/*`
pub fn build_router(state: Arc<BridgeState>) -> Router {
    let mcp = mcp_routes(state.core.clone()).layer(axum::middleware::from_fn_with_state(
        state.clone(),
        api_key_guard,
    ));

    Router::new()
        .merge(mcp)
        .nest("/bridge/v1", v1::v1_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
}

/// Background work: idle-session sweep and listChanged fan-out on
/// registry fingerprint transitions.
pub fn spawn_background_tasks(state: &Arc<BridgeState>) -> Vec<tokio::task::JoinHandle<()>> {
    let sweeper = McpServerCore::spawn_idle_sweeper(state.core.clone());

    let mut fingerprints = state.registry.subscribe();
    let core = state.core.clone();
    let notifier = tokio::spawn(async move {
        while fingerprints.changed().await.is_ok() {
            tracing::info!("tool set changed, notifying open sessions");
            core.notify_tools_changed();
        }
    });

    vec![sweeper, notifier]
}

/// Run the bridge until the process dies
pub async fn start_bridge(config: BridgeConfig, registry: Arc<ToolRegistry>) -> Result<()> {
    let state = build_bridge(registry, config.api_key.clone());
    let app = build_router(state.clone());
    let _tasks = spawn_background_tasks(&state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| NotegateError::config(format!("Invalid bridge address: {}", e)))?;

    tracing::info!("Starting plugin bridge on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NotegateError::config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| NotegateError::config(format!("Bridge server error: {}", e)))?;

    Ok(())
}

/// Shared API key check on `/mcp`; missing or wrong key is 401.
/// The v1 surface stays open: the host already restricts access.
async fn api_key_guard(
    State(state): State<Arc<BridgeState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(BRIDGE_API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1 => {
            next.run(request).await
        }
        Some(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized", "message": "Invalid API key"})),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized", "message": "Missing API key"})),
        )
            .into_response(),
    }
}
