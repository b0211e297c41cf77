//! MCP protocol and session core
//!
//! The streamable HTTP transport, the session table, the server core
//! binding method handlers to it, and the HTTP client the gateway
//! uses to reach plugin bridges.

pub mod client;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{McpHttpClient, UpstreamError, parse_sse_data};
pub use protocol::{
    CallToolParams, InitializeParams, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ServerIdentity, initialize_result,
};
pub use server::{McpHandler, McpServerCore, UnknownSessionPolicy};
pub use session::{McpSession, SessionTable, SessionUser, generate_session_id};
pub use transport::mcp_routes;
