//! Streamable HTTP MCP client
//!
//! The gateway speaks to plugin bridges with this client: initialize
//! to open an upstream session, replay requests under its id, DELETE
//! on teardown. Responses may arrive as plain JSON or as single-frame
//! SSE streams, depending on the bridge's framing choice.

use crate::constants::{
    BRIDGE_API_KEY_HEADER, MCP_PROTOCOL_VERSION, MCP_SESSION_HEADER,
};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors from the upstream hop, kept distinct so the router can
/// recover an expired session exactly once.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The bridge no longer knows the session (HTTP 404)
    #[error("upstream session expired")]
    SessionExpired,

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream protocol error: {0}")]
    Protocol(String),
}

/// MCP client bound to one plugin bridge endpoint
pub struct McpHttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    next_id: AtomicI64,
}

impl McpHttpClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            next_id: AtomicI64::new(1),
        })
    }

    /// Open an upstream session; returns its `MCP-Session-Id`.
    pub async fn initialize(&self) -> Result<String, UpstreamError> {
        let request = JsonRpcRequest::new(
            self.next_id(),
            "initialize",
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "notegate-gateway",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
        );

        let mut builder = self.http.post(self.mcp_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(BRIDGE_API_KEY_HEADER, key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let session_id = response
            .headers()
            .get(MCP_SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or_else(|| {
                UpstreamError::Protocol("initialize response missing MCP-Session-Id".to_string())
            })?;

        let body = Self::decode_body(response).await?;
        if let Some(error) = body.error {
            return Err(UpstreamError::Protocol(format!(
                "initialize rejected: {}",
                error.message
            )));
        }

        Ok(session_id)
    }

    /// Send one request under an established upstream session.
    pub async fn request(
        &self,
        session_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, UpstreamError> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);

        let mut builder = self
            .http
            .post(self.mcp_url())
            .header(MCP_SESSION_HEADER, session_id)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(BRIDGE_API_KEY_HEADER, key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::SessionExpired);
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Self::decode_body(response).await
    }

    /// Best-effort session teardown.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), UpstreamError> {
        let mut builder = self
            .http
            .delete(self.mcp_url())
            .header(MCP_SESSION_HEADER, session_id);
        if let Some(key) = &self.api_key {
            builder = builder.header(BRIDGE_API_KEY_HEADER, key);
        }
        builder.send().await?;
        Ok(())
    }

    fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Decode a response body, accepting both JSON and SSE framing.
    async fn decode_body(response: reqwest::Response) -> Result<JsonRpcResponse, UpstreamError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await?;

        let payload = if content_type.starts_with("text/event-stream") {
            parse_sse_data(&text).ok_or_else(|| {
                UpstreamError::Protocol("event stream carried no message".to_string())
            })?
        } else {
            text
        };

        serde_json::from_str(&payload)
            .map_err(|e| UpstreamError::Protocol(format!("invalid JSON-RPC response: {}", e)))
    }
}

/// Extract the data payload of the first SSE event in a body.
/// Multiple `data:` lines within one event are joined with newlines.
pub fn parse_sse_data(body: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !data_lines.is_empty() {
                break;
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
