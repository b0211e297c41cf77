//! Bearer authentication for the gateway `/mcp` surface
//!
//! Validates the access token on every protected request and attaches
//! the resolved user to the request scope. Challenges carry the RFC
//! 9728 resource metadata URL so clients can discover the
//! authorization server.

use super::store::TokenStore;
use crate::mcp::session::SessionUser;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// State for the `/mcp` bearer middleware
#[derive(Clone)]
pub struct McpAuthState {
    pub store: Arc<TokenStore>,

    /// Advertised in every challenge
    pub resource_metadata_url: String,
}

/// Require `Authorization: Bearer <token>`; on success the resolved
/// user and token ride along in the request extensions.
pub async fn mcp_auth_middleware(
    State(state): State<Arc<McpAuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let Some(token) = token else {
        return challenge(&state, None);
    };

    let Some(access) = state.store.access_token(token) else {
        tracing::debug!("rejected invalid or expired bearer token");
        return challenge(&state, Some("invalid_token"));
    };

    request
        .extensions_mut()
        .insert(SessionUser(access.user_id.clone()));
    request.extensions_mut().insert(access);

    next.run(request).await
}

/// 401 with a `WWW-Authenticate: Bearer` challenge per RFC 6750/9728
fn challenge(state: &McpAuthState, error: Option<&str>) -> Response {
    let mut value = format!(
        "Bearer resource_metadata=\"{}\"",
        state.resource_metadata_url
    );
    if let Some(error) = error {
        value.push_str(&format!(", error=\"{}\"", error));
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, value)],
        "Unauthorized",
    )
        .into_response()
}
