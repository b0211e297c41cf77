//! Admin API
//!
//! CRUD over plugin-token records behind a dedicated shared-secret
//! bearer. Missing credentials are 401; a wrong secret is 403 — never
//! the MCP surface's discovery challenge.

use crate::auth::TokenStore;
use crate::model::PluginToken;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub struct AdminState {
    pub store: Arc<TokenStore>,
    pub admin_secret: String,
}

pub fn admin_routes(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/admin/plugins", get(list_plugins).post(create_plugin))
        .route(
            "/admin/plugins/{id}",
            get(get_plugin).delete(delete_plugin),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth,
        ))
        .with_state(state)
}

/// Dedicated admin bearer: absent credentials 401, wrong secret 403
async fn admin_auth(
    State(state): State<Arc<AdminState>>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match token {
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized", "message": "Missing admin credentials"})),
        )
            .into_response(),
        Some(token)
            if token
                .as_bytes()
                .ct_eq(state.admin_secret.as_bytes())
                .unwrap_u8()
                == 1 =>
        {
            next.run(request).await
        }
        Some(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "forbidden", "message": "Invalid admin secret"})),
        )
            .into_response(),
    }
}

async fn list_plugins(State(state): State<Arc<AdminState>>) -> Json<Value> {
    Json(json!({"plugins": state.store.plugins()}))
}

async fn create_plugin(State(state): State<Arc<AdminState>>, Json(body): Json<Value>) -> Response {
    let field = |key: &str| body.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());

    let (Some(name), Some(secret), Some(host), Some(user_id)) = (
        field("name"),
        field("secret"),
        field("host"),
        field("user_id"),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_request",
                "message": "name, secret, host, port and user_id are required",
            })),
        )
            .into_response();
    };

    let Some(port) = body.get("port").and_then(|v| v.as_u64()).and_then(|p| u16::try_from(p).ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request", "message": "port must be a valid TCP port"})),
        )
            .into_response();
    };

    let plugin = PluginToken {
        id: Uuid::new_v4().to_string(),
        name,
        secret,
        host,
        port,
        user_id,
        require_auth: body
            .get("require_auth")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        created_at: Utc::now(),
    };
    state.store.upsert_plugin(plugin.clone());
    tracing::info!(plugin = %plugin.id, user = %plugin.user_id, "registered plugin binding");

    (StatusCode::CREATED, Json(json!(plugin))).into_response()
}

async fn get_plugin(State(state): State<Arc<AdminState>>, Path(id): Path<String>) -> Response {
    match state.store.plugin(&id) {
        Some(plugin) => Json(json!(plugin)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "message": format!("No plugin {}", id)})),
        )
            .into_response(),
    }
}

async fn delete_plugin(State(state): State<Arc<AdminState>>, Path(id): Path<String>) -> Response {
    if state.store.remove_plugin(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "message": format!("No plugin {}", id)})),
        )
            .into_response()
    }
}
