//! Remote MCP gateway (tier B)
//!
//! Public endpoint tying the pieces together: the OAuth 2.1
//! authorization server, the bearer-guarded `/mcp` transport, the
//! per-user upstream router, the admin surface, and the fingerprint
//! poller.

pub mod admin;
pub mod poller;
pub mod router;

use crate::auth::{
    McpAuthState, OAuthServerState, TokenStore, UpstreamIdp, create_oauth_routes,
    mcp_auth_middleware,
};
use crate::config::GatewayConfig;
use crate::mcp::protocol::ServerIdentity;
use crate::mcp::server::{McpServerCore, UnknownSessionPolicy};
use crate::mcp::session::SessionTable;
use crate::mcp::transport::mcp_routes;
use crate::{NotegateError, Result};
use admin::{AdminState, admin_routes};
use axum::{Json, Router, routing::get};
use router::UpstreamRouter;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Assembled gateway state
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub store: Arc<TokenStore>,
    pub router: Arc<UpstreamRouter>,
    pub core: Arc<McpServerCore>,
    pub oauth: Arc<OAuthServerState>,
}

/// Wire up the gateway over a fresh in-memory store
pub fn build_gateway(config: GatewayConfig) -> Result<Arc<GatewayContext>> {
    let store = Arc::new(TokenStore::new());
    build_gateway_with_store(config, store)
}

/// Wire up the gateway over an existing store (tests seed it)
pub fn build_gateway_with_store(
    config: GatewayConfig,
    store: Arc<TokenStore>,
) -> Result<Arc<GatewayContext>> {
    let upstream = UpstreamIdp::new(config.idp.clone(), config.idp_callback_url())?;

    let router = Arc::new(UpstreamRouter::new(store.clone()));
    let core = Arc::new(McpServerCore::new(
        ServerIdentity::new("notegate-gateway"),
        Arc::new(SessionTable::new()),
        router.clone(),
        // Deployed clients expect 400 for dead sessions on this tier
        UnknownSessionPolicy::BadRequest,
    ));

    let oauth = Arc::new(OAuthServerState {
        store: store.clone(),
        config: config.clone(),
        upstream,
    });

    Ok(Arc::new(GatewayContext {
        config,
        store,
        router,
        core,
        oauth,
    }))
}

/// Build the gateway router with all surfaces
pub fn build_router(context: Arc<GatewayContext>) -> Router {
    let auth_state = Arc::new(McpAuthState {
        store: context.store.clone(),
        resource_metadata_url: context.config.resource_metadata_url(),
    });

    let mcp = mcp_routes(context.core.clone()).layer(axum::middleware::from_fn_with_state(
        auth_state,
        mcp_auth_middleware,
    ));

    let admin = admin_routes(Arc::new(AdminState {
        store: context.store.clone(),
        admin_secret: context.config.admin_secret.clone(),
    }));

    Router::new()
        .route("/healthz", get(health_handler))
        .merge(mcp)
        .merge(create_oauth_routes(context.oauth.clone()))
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Browser-based MCP clients talk to the OAuth endpoints
                // cross-origin
                .layer(CorsLayer::permissive()),
        )
}

/// Background work: token sweep, idle-session sweep, tool polling
pub fn spawn_background_tasks(context: &Arc<GatewayContext>) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        TokenStore::spawn_sweeper(context.store.clone()),
        McpServerCore::spawn_idle_sweeper(context.core.clone()),
        poller::spawn_tool_poller(
            context.store.clone(),
            context.router.clone(),
            context.core.clone(),
        ),
    ]
}

/// Run the gateway until the process dies
pub async fn start_gateway(config: GatewayConfig) -> Result<()> {
    let context = build_gateway(config)?;
    let app = build_router(context.clone());
    let _tasks = spawn_background_tasks(&context);

    let addr: SocketAddr = format!("{}:{}", context.config.host, context.config.port)
        .parse()
        .map_err(|e| NotegateError::config(format!("Invalid gateway address: {}", e)))?;

    tracing::info!(
        "Starting gateway on {} (external URL {})",
        addr,
        context.config.external_url
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NotegateError::config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| NotegateError::config(format!("Gateway server error: {}", e)))?;

    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
