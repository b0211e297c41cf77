//! Constants used throughout Notegate
//!
//! Header names, endpoint paths, protocol identifiers and default
//! limits shared by the bridge and the gateway.

// ============================================================================
// MCP WIRE CONTRACT
// ============================================================================

/// Session id header on `/mcp` (case-insensitive per HTTP)
pub const MCP_SESSION_HEADER: &str = "mcp-session-id";

/// Protocol version header, echoed back on initialize
pub const MCP_PROTOCOL_HEADER: &str = "mcp-protocol-version";

/// MCP protocol revision this server speaks
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC version string
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for session-level failures
pub const JSONRPC_SESSION_ERROR: i64 = -32000;

/// JSON-RPC error code for unknown methods
pub const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for malformed JSON
pub const JSONRPC_PARSE_ERROR: i64 = -32700;

/// JSON-RPC error code for structurally invalid requests
pub const JSONRPC_INVALID_REQUEST: i64 = -32600;

// ============================================================================
// BRIDGE (TIER A)
// ============================================================================

/// Shared API key header checked on the bridge `/mcp` surface
pub const BRIDGE_API_KEY_HEADER: &str = "x-api-key";

/// Default bridge bind host (loopback only; the vault host is local)
pub const DEFAULT_BRIDGE_HOST: &str = "127.0.0.1";

/// Default bridge port
pub const DEFAULT_BRIDGE_PORT: u16 = 27123;

/// Legacy REST surface protocol revision
pub const BRIDGE_V1_PROTOCOL_VERSION: &str = "1";

/// Maximum accepted v1 request body (1 MiB)
pub const BRIDGE_V1_MAX_BODY_BYTES: usize = 1024 * 1024;

// ============================================================================
// GATEWAY (TIER B)
// ============================================================================

/// Default gateway port
pub const DEFAULT_GATEWAY_PORT: u16 = 8787;

/// Environment variable: gateway bind host
pub const ENV_GATEWAY_HOST: &str = "NOTEGATE_HOST";

/// Environment variable: gateway port
pub const ENV_GATEWAY_PORT: &str = "NOTEGATE_PORT";

/// Environment variable: external URL published in metadata
pub const ENV_EXTERNAL_URL: &str = "NOTEGATE_EXTERNAL_URL";

/// Environment variable: upstream IdP name (used in the callback path)
pub const ENV_IDP_NAME: &str = "NOTEGATE_IDP_NAME";

/// Environment variable: upstream IdP client id
pub const ENV_IDP_CLIENT_ID: &str = "NOTEGATE_IDP_CLIENT_ID";

/// Environment variable: upstream IdP client secret
pub const ENV_IDP_CLIENT_SECRET: &str = "NOTEGATE_IDP_CLIENT_SECRET";

/// Environment variable: upstream IdP authorize URL
pub const ENV_IDP_AUTHORIZE_URL: &str = "NOTEGATE_IDP_AUTHORIZE_URL";

/// Environment variable: upstream IdP token URL
pub const ENV_IDP_TOKEN_URL: &str = "NOTEGATE_IDP_TOKEN_URL";

/// Environment variable: upstream IdP user profile URL
pub const ENV_IDP_USERINFO_URL: &str = "NOTEGATE_IDP_USERINFO_URL";

/// Environment variable: admin API shared secret
pub const ENV_ADMIN_SECRET: &str = "NOTEGATE_ADMIN_SECRET";

/// Environment variable: optional session secret
pub const ENV_SESSION_SECRET: &str = "NOTEGATE_SESSION_SECRET";

// ============================================================================
// LIFETIMES & LIMITS
// ============================================================================

/// Access token lifetime (1 hour cap per OAuth 2.1 guidance)
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Authorization code and pending-auth lifetime (10 minute cap)
pub const AUTH_CODE_TTL_SECS: i64 = 600;

/// MCP session idle timeout (minimum mandated is 30 minutes)
pub const SESSION_IDLE_TIMEOUT_SECS: i64 = 30 * 60;

/// Sweep interval for expired sessions, tokens, codes and pendings
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Upstream tool-set polling interval
pub const TOOL_POLL_INTERVAL_SECS: u64 = 5;

/// Gateway-to-plugin request timeout
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Intra-host (poller, health) request timeout
pub const LOCAL_TIMEOUT_SECS: u64 = 5;

/// SSE keep-alive ping interval
pub const SSE_KEEP_ALIVE_SECS: u64 = 15;

/// Default OAuth scope granted when a client asks for none
pub const DEFAULT_SCOPE: &str = "mcp";
