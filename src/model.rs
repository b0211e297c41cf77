//! Core data models for Notegate
//!
//! Wire-level and store-level data structures shared by the plugin
//! bridge and the remote gateway: tool descriptors and call results,
//! OAuth records, and plugin bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

// ============================================================================
// TOOLS
// ============================================================================

/// Where a tool definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    /// Registered by the host itself
    Builtin,
    /// Registered by the user-scripting loader
    Script,
}

/// Wire form of a tool definition, shared by the MCP and v1 surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON-Schema-like input schema with an object-typed root
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One item of tool output content
///
/// Known variants are `text` and `image`; anything else a handler
/// produces is carried opaquely and flattened to text before it
/// leaves the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text { text: String },
    Image { data: String, mime_type: String },
    Opaque(Value),
}

impl ToolContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ToolContent::Text { text: text.into() }
    }
}

impl Serialize for ToolContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ToolContent::Text { text } => json!({"type": "text", "text": text}),
            ToolContent::Image { data, mime_type } => {
                json!({"type": "image", "data": data, "mimeType": mime_type})
            }
            ToolContent::Opaque(value) => value.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ToolContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                    return Ok(ToolContent::Text {
                        text: text.to_string(),
                    });
                }
                Ok(ToolContent::Opaque(value))
            }
            Some("image") => {
                if let (Some(data), Some(mime_type)) = (
                    value.get("data").and_then(|d| d.as_str()),
                    value.get("mimeType").and_then(|m| m.as_str()),
                ) {
                    return Ok(ToolContent::Image {
                        data: data.to_string(),
                        mime_type: mime_type.to_string(),
                    });
                }
                Ok(ToolContent::Opaque(value))
            }
            _ => Ok(ToolContent::Opaque(value)),
        }
    }
}

/// Result of a tool invocation as placed in the JSON-RPC result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,

    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result carrying the given content
    pub fn success(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// In-band failure carrying a single text item
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }
}

// ============================================================================
// OAUTH RECORDS
// ============================================================================

/// Dynamically registered OAuth client (RFC 7591)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique identifier
    pub client_id: String,

    /// Secret, minted only for `client_secret_post` clients
    pub client_secret: Option<String>,

    /// Client display name
    pub client_name: Option<String>,

    /// Allowed redirect URIs (non-empty, matched exactly)
    pub redirect_uris: Vec<String>,

    /// `none` or `client_secret_post`
    pub token_endpoint_auth_method: String,

    /// Allowed grant types
    pub grant_types: Vec<String>,

    /// Allowed response types
    pub response_types: Vec<String>,

    /// Granted scope
    pub scope: String,

    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Whether the client must authenticate at the token endpoint
    pub fn is_confidential(&self) -> bool {
        self.token_endpoint_auth_method == "client_secret_post"
    }
}

/// One-time authorization code minted after the upstream IdP round-trip
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Opaque code value (≥128-bit random)
    pub code: String,

    /// Client the code was issued to
    pub client_id: String,

    /// Redirect URI echoed from the authorize request
    pub redirect_uri: String,

    /// Granted scope
    pub scope: String,

    /// PKCE S256 challenge supplied by the client
    pub code_challenge: String,

    /// User resolved from the upstream IdP profile
    pub user_id: String,

    /// Upstream IdP access token captured for this user
    pub upstream_token: String,

    /// Hard expiry, at most 10 minutes after minting
    pub expires_at: DateTime<Utc>,
}

/// Bearer token accepted on the gateway `/mcp` surface
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scope: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Single-use refresh token, rotated on every refresh grant
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scope: String,
    pub user_id: String,

    /// The access token this refresh token last minted
    pub access_token: String,
}

/// A user's registered plugin bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginToken {
    /// Record id
    pub id: String,

    /// Display name
    pub name: String,

    /// Shared secret the gateway presents to the plugin `/mcp`
    pub secret: String,

    /// Plugin bridge host
    pub host: String,

    /// Plugin bridge port
    pub port: u16,

    /// Owning user
    pub user_id: String,

    /// Whether the plugin enforces the shared secret
    pub require_auth: bool,

    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl PluginToken {
    /// Base URL of the plugin bridge listener
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Authorize-request parameters parked across the upstream IdP redirect
#[derive(Debug, Clone)]
pub struct PendingAuth {
    /// Fresh state token sent to the upstream IdP (the record key)
    pub state: String,

    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,

    /// The client's own state parameter, echoed on the way back
    pub client_state: Option<String>,

    /// PKCE S256 challenge supplied by the client
    pub code_challenge: String,

    /// PKCE verifier for the upstream leg of the flow
    pub upstream_pkce_verifier: String,

    /// Same TTL as authorization codes
    pub expires_at: DateTime<Utc>,
}
