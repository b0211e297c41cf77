//! OAuth 2.1 authorization server
//!
//! The gateway's own authorization server: RFC 8414/9728 discovery,
//! RFC 7591 dynamic registration, a PKCE-only authorization endpoint
//! that round-trips the browser through the upstream IdP, the token
//! endpoint with code and refresh grants, RFC 7009 revocation and
//! RFC 7662 introspection. All state lives in the in-memory
//! `TokenStore`.

use super::store::TokenStore;
use super::upstream::UpstreamIdp;
use crate::config::GatewayConfig;
use crate::constants::{ACCESS_TOKEN_TTL_SECS, AUTH_CODE_TTL_SECS, DEFAULT_SCOPE};
use crate::model::{AccessToken, AuthorizationCode, OAuthClient, PendingAuth, RefreshToken};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// OAuth server state
pub struct OAuthServerState {
    pub store: Arc<TokenStore>,
    pub config: GatewayConfig,
    pub upstream: UpstreamIdp,
}

/// Token response per RFC 6749 §5.1
#[derive(Debug, Serialize)]
struct TokenResponseBody {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: String,
    scope: String,
}

/// Create OAuth routes
pub fn create_oauth_routes(state: Arc<OAuthServerState>) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(handle_as_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(handle_resource_metadata),
        )
        .route("/oauth/register", post(handle_client_registration))
        .route("/oauth/authorize", get(handle_authorize))
        .route("/oauth/{idp}/callback", get(handle_idp_callback))
        .route("/oauth/token", post(handle_token))
        .route("/oauth/revoke", post(handle_token_revocation))
        .route("/oauth/introspect", post(handle_token_introspection))
        .with_state(state)
}

/// RFC 8414 authorization server metadata
async fn handle_as_metadata(State(state): State<Arc<OAuthServerState>>) -> Json<Value> {
    let issuer = &state.config.external_url;
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{}/oauth/authorize", issuer),
        "token_endpoint": format!("{}/oauth/token", issuer),
        "registration_endpoint": format!("{}/oauth/register", issuer),
        "revocation_endpoint": format!("{}/oauth/revoke", issuer),
        "introspection_endpoint": format!("{}/oauth/introspect", issuer),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["none", "client_secret_post"],
        "scopes_supported": [DEFAULT_SCOPE],
    }))
}

/// RFC 9728 protected resource metadata: this server is both the
/// resource and its authorization server.
async fn handle_resource_metadata(State(state): State<Arc<OAuthServerState>>) -> Json<Value> {
    let issuer = &state.config.external_url;
    Json(json!({
        "resource": format!("{}/mcp", issuer),
        "authorization_servers": [issuer],
        "scopes_supported": [DEFAULT_SCOPE],
        "bearer_methods_supported": ["header"],
    }))
}

/// Handle dynamic client registration (RFC 7591)
async fn handle_client_registration(
    State(state): State<Arc<OAuthServerState>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(redirect_uris) = body.get("redirect_uris").and_then(|v| v.as_array()) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_client_metadata",
            "redirect_uris is required",
        );
    };
    if redirect_uris.is_empty() {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_client_metadata",
            "redirect_uris must not be empty",
        );
    }

    let mut uris = Vec::with_capacity(redirect_uris.len());
    for uri in redirect_uris {
        let Some(uri) = uri.as_str() else {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_client_metadata",
                "redirect_uris entries must be strings",
            );
        };
        if !is_valid_redirect_uri(uri) {
            return oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_redirect_uri",
                &format!("Invalid redirect URI: {}", uri),
            );
        }
        uris.push(uri.to_string());
    }

    let auth_method = body
        .get("token_endpoint_auth_method")
        .and_then(|v| v.as_str())
        .unwrap_or("none")
        .to_string();
    if auth_method != "none" && auth_method != "client_secret_post" {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_client_metadata",
            &format!("Unsupported token_endpoint_auth_method: {}", auth_method),
        );
    }

    let grant_types = string_array(&body, "grant_types").unwrap_or_else(|| {
        vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ]
    });
    let response_types =
        string_array(&body, "response_types").unwrap_or_else(|| vec!["code".to_string()]);
    let scope = body
        .get("scope")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_SCOPE)
        .to_string();
    let client_name = body
        .get("client_name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let now = Utc::now();
    let client = OAuthClient {
        client_id: Uuid::new_v4().to_string(),
        // A secret is minted only for clients that authenticate
        client_secret: (auth_method == "client_secret_post").then(generate_client_secret),
        client_name,
        redirect_uris: uris,
        token_endpoint_auth_method: auth_method,
        grant_types,
        response_types,
        scope,
        created_at: now,
    };
    state.store.insert_client(client.clone());
    tracing::info!(client_id = %client.client_id, "registered OAuth client");

    let mut response = json!({
        "client_id": client.client_id,
        "client_id_issued_at": now.timestamp(),
        "redirect_uris": client.redirect_uris,
        "token_endpoint_auth_method": client.token_endpoint_auth_method,
        "grant_types": client.grant_types,
        "response_types": client.response_types,
        "scope": client.scope,
    });
    if let Some(name) = &client.client_name {
        response["client_name"] = json!(name);
    }
    if let Some(secret) = &client.client_secret {
        response["client_secret"] = json!(secret);
        response["client_secret_expires_at"] = json!(0);
    }

    (StatusCode::CREATED, Json(response)).into_response()
}

/// Handle an authorization request: validate, park the parameters,
/// and bounce the browser to the upstream IdP.
async fn handle_authorize(
    State(state): State<Arc<OAuthServerState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    // Expired pendings are swept opportunistically on every authorize
    state.store.sweep_pending();

    let param = |key: &str| query.get(key).map(|v| v.to_string()).filter(|v| !v.is_empty());

    let (Some(client_id), Some(redirect_uri), Some(response_type)) = (
        param("client_id"),
        param("redirect_uri"),
        param("response_type"),
    ) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "client_id, redirect_uri and response_type are required",
        );
    };

    let Some(client) = state.store.client(&client_id) else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_client", "Unknown client");
    };

    // Exact string match against the registered values
    if !client.redirect_uris.contains(&redirect_uri) {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_redirect_uri",
            "redirect_uri is not registered for this client",
        );
    }

    if response_type != "code" {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_response_type",
            "Only response_type=code is supported",
        );
    }

    let Some(code_challenge) = param("code_challenge") else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "code_challenge is required",
        );
    };
    if param("code_challenge_method").as_deref() != Some("S256") {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "code_challenge_method must be S256",
        );
    }

    let scope = param("scope").unwrap_or_else(|| DEFAULT_SCOPE.to_string());

    // Fresh state token keys the pending record across the IdP hop
    let upstream_state = generate_token();
    let (idp_url, pkce_verifier) = match state.upstream.authorize_url(&upstream_state) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("failed to build IdP authorize URL: {}", e);
            return oauth_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "Upstream identity provider unavailable",
            );
        }
    };

    state.store.insert_pending(PendingAuth {
        state: upstream_state,
        client_id,
        redirect_uri,
        scope,
        client_state: param("state"),
        code_challenge,
        upstream_pkce_verifier: pkce_verifier,
        expires_at: Utc::now() + Duration::seconds(AUTH_CODE_TTL_SECS),
    });

    found(&idp_url)
}

/// Upstream IdP callback: consume the pending record, trade the
/// upstream code for a profile, mint our own authorization code and
/// send the browser back to the client.
async fn handle_idp_callback(
    State(state): State<Arc<OAuthServerState>>,
    Path(idp): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if idp != state.config.idp.name {
        return oauth_error(
            StatusCode::NOT_FOUND,
            "invalid_request",
            &format!("Unknown identity provider: {}", idp),
        );
    }

    let Some(upstream_state) = query.get("state") else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request", "state is required");
    };

    // Single-use: the pending record is gone after this lookup
    let Some(pending) = state.store.consume_pending(upstream_state) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Unknown or expired authorization request",
        );
    };

    if let Some(error) = query.get("error") {
        tracing::warn!(error = %error, "upstream IdP rejected authorization");
        return redirect_with_error(&pending);
    }

    let Some(code) = query.get("code") else {
        return redirect_with_error(&pending);
    };

    let upstream_token = match state
        .upstream
        .exchange_code(code, &pending.upstream_pkce_verifier)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("upstream code exchange failed: {}", e);
            return redirect_with_error(&pending);
        }
    };

    let user_id = match state.upstream.fetch_user(&upstream_token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::error!("upstream profile fetch failed: {}", e);
            return redirect_with_error(&pending);
        }
    };

    let code = generate_token();
    state.store.insert_code(AuthorizationCode {
        code: code.clone(),
        client_id: pending.client_id.clone(),
        redirect_uri: pending.redirect_uri.clone(),
        scope: pending.scope.clone(),
        code_challenge: pending.code_challenge.clone(),
        user_id: user_id.clone(),
        upstream_token,
        expires_at: Utc::now() + Duration::seconds(AUTH_CODE_TTL_SECS),
    });
    tracing::info!(user = %user_id, client = %pending.client_id, "minted authorization code");

    let mut pairs = vec![("code", code)];
    if let Some(client_state) = &pending.client_state {
        pairs.push(("state", client_state.clone()));
    }
    match append_query(&pending.redirect_uri, &pairs) {
        Some(url) => found(&url),
        None => oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Client redirect URI is not a valid URL",
        ),
    }
}

/// Handle token requests; accepts JSON and form-encoded bodies.
async fn handle_token(
    State(state): State<Arc<OAuthServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(params) = parse_params(&headers, &body) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Request body must be JSON or form-encoded",
        );
    };

    let grant_type = params.get("grant_type").cloned();
    match grant_type.as_deref() {
        Some("authorization_code") => handle_authorization_code_grant(state, params).await,
        Some("refresh_token") => handle_refresh_token_grant(state, params).await,
        Some(other) => oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            &format!("Unsupported grant_type: {}", other),
        ),
        None => oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "grant_type is required",
        ),
    }
}

/// Handle the authorization_code grant
async fn handle_authorization_code_grant(
    state: Arc<OAuthServerState>,
    params: HashMap<String, String>,
) -> Response {
    let (Some(code), Some(redirect_uri), Some(client_id), Some(code_verifier)) = (
        params.get("code"),
        params.get("redirect_uri"),
        params.get("client_id"),
        params.get("code_verifier"),
    ) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "code, redirect_uri, client_id and code_verifier are required",
        );
    };

    // Atomic, exactly-once redemption; a replay lands here
    let Some(record) = state.store.consume_code(code) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "Authorization code is invalid or expired",
        );
    };

    if record.client_id != *client_id {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "client_id mismatch");
    }
    if record.redirect_uri != *redirect_uri {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "redirect_uri mismatch",
        );
    }

    let Some(client) = state.store.client(client_id) else {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "Unknown client");
    };
    if let Some(response) = check_client_secret(&client, &params) {
        return response;
    }

    // PKCE: BASE64URL(SHA256(code_verifier)) must equal the stored
    // challenge; constant-time comparison
    let computed = pkce_challenge_s256(code_verifier);
    if computed
        .as_bytes()
        .ct_eq(record.code_challenge.as_bytes())
        .unwrap_u8()
        == 0
    {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "PKCE validation failed",
        );
    }

    mint_pair_response(&state.store, &record.client_id, &record.scope, &record.user_id)
}

/// Handle the refresh_token grant with rotation
async fn handle_refresh_token_grant(
    state: Arc<OAuthServerState>,
    params: HashMap<String, String>,
) -> Response {
    let Some(refresh_token) = params.get("refresh_token") else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "refresh_token is required",
        );
    };

    // Single-use: the old refresh token and its access token are
    // revoked before the new pair exists
    let Some(record) = state.store.consume_refresh(refresh_token) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_grant",
            "Refresh token is invalid or already used",
        );
    };

    if let Some(client_id) = params.get("client_id")
        && *client_id != record.client_id
    {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "client_id mismatch");
    }

    let Some(client) = state.store.client(&record.client_id) else {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "Unknown client");
    };
    if let Some(response) = check_client_secret(&client, &params) {
        return response;
    }

    mint_pair_response(&state.store, &record.client_id, &record.scope, &record.user_id)
}

/// Handle token revocation (RFC 7009): always 200, never leaks
/// whether the token existed.
async fn handle_token_revocation(
    State(state): State<Arc<OAuthServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(params) = parse_params(&headers, &body) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Request body must be JSON or form-encoded",
        );
    };
    let Some(token) = params.get("token") else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request", "token is required");
    };

    state.store.revoke_access(token);
    state.store.revoke_refresh(token);

    (StatusCode::OK, Json(json!({}))).into_response()
}

/// Handle token introspection (RFC 7662)
async fn handle_token_introspection(
    State(state): State<Arc<OAuthServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(params) = parse_params(&headers, &body) else {
        return oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Request body must be JSON or form-encoded",
        );
    };
    let Some(token) = params.get("token") else {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request", "token is required");
    };

    match state.store.access_token(token) {
        Some(access) => Json(json!({
            "active": true,
            "scope": access.scope,
            "client_id": access.client_id,
            "username": access.user_id,
            "exp": access.expires_at.timestamp(),
        }))
        .into_response(),
        None => Json(json!({"active": false})).into_response(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Mint and store an access+refresh pair, answering RFC 6749 JSON
fn mint_pair_response(
    store: &TokenStore,
    client_id: &str,
    scope: &str,
    user_id: &str,
) -> Response {
    let access = AccessToken {
        token: generate_token(),
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        user_id: user_id.to_string(),
        expires_at: Utc::now() + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
    };
    let refresh = RefreshToken {
        token: generate_token(),
        client_id: client_id.to_string(),
        scope: scope.to_string(),
        user_id: user_id.to_string(),
        access_token: access.token.clone(),
    };
    store.insert_access(access.clone());
    store.insert_refresh(refresh.clone());

    Json(TokenResponseBody {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
        refresh_token: refresh.token,
        scope: scope.to_string(),
    })
    .into_response()
}

/// Confidential clients must present the correct secret
fn check_client_secret(client: &OAuthClient, params: &HashMap<String, String>) -> Option<Response> {
    if !client.is_confidential() {
        return None;
    }
    let expected = client.client_secret.as_deref().unwrap_or_default();
    let presented = params.get("client_secret").map(|s| s.as_str()).unwrap_or("");
    if presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 0 {
        return Some(oauth_error(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "Invalid client credentials",
        ));
    }
    None
}

/// Parse a token-endpoint body: JSON object or form-encoded pairs
fn parse_params(headers: &HeaderMap, body: &[u8]) -> Option<HashMap<String, String>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") {
        let value: Value = serde_json::from_slice(body).ok()?;
        let object = value.as_object()?;
        Some(
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
        )
    } else {
        Some(url::form_urlencoded::parse(body).into_owned().collect())
    }
}

fn string_array(body: &Value, key: &str) -> Option<Vec<String>> {
    let items = body.get(key)?.as_array()?;
    let strings: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    if strings.is_empty() { None } else { Some(strings) }
}

/// Compute the S256 PKCE challenge for a verifier
pub fn pkce_challenge_s256(code_verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        hasher.finalize(),
    )
}

/// Validate redirect URI: HTTPS or loopback HTTP, no fragments
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.is_empty() || uri.len() > 2048 {
        return false;
    }

    if let Ok(parsed) = url::Url::parse(uri) {
        if parsed.scheme() != "https"
            && (parsed.host_str() != Some("localhost") && parsed.host_str() != Some("127.0.0.1"))
        {
            return false;
        }

        // No fragments allowed (OAuth 2.1 security)
        if parsed.fragment().is_some() {
            return false;
        }

        true
    } else {
        false
    }
}

/// Append query pairs to a redirect URI
fn append_query(uri: &str, pairs: &[(&str, String)]) -> Option<String> {
    let mut url = url::Url::parse(uri).ok()?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Some(url.to_string())
}

/// Redirect back to the client with `error=server_error`
fn redirect_with_error(pending: &PendingAuth) -> Response {
    let mut pairs = vec![("error", "server_error".to_string())];
    if let Some(client_state) = &pending.client_state {
        pairs.push(("state", client_state.clone()));
    }
    match append_query(&pending.redirect_uri, &pairs) {
        Some(url) => found(&url),
        None => oauth_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Client redirect URI is not a valid URL",
        ),
    }
}

/// 302 redirect
fn found(location: &str) -> Response {
    match axum::http::HeaderValue::from_str(location) {
        Ok(value) => (
            StatusCode::FOUND,
            [(header::LOCATION, value)],
        )
            .into_response(),
        Err(_) => oauth_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Redirect target is not a valid header value",
        ),
    }
}

fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        Json(json!({"error": error, "error_description": description})),
    )
        .into_response()
}

/// Generate an opaque token (256 bits from the OS RNG)
pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Generate a client secret (256 bits from the OS RNG)
pub fn generate_client_secret() -> String {
    generate_token()
}
