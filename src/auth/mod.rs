//! OAuth 2.1 authentication system
//!
//! The gateway's authorization server, its in-memory token store, the
//! upstream IdP client, and the bearer middleware guarding `/mcp`:
//! - **Server**: RFC 8414/9728 discovery, RFC 7591 registration, PKCE
//!   authorization-code and refresh grants, RFC 7009 revocation
//! - **Upstream**: round-trip to the configured identity provider
//! - **Middleware**: bearer validation with discovery challenges

pub mod middleware;
pub mod server;
pub mod store;
pub mod upstream;

pub use middleware::{McpAuthState, mcp_auth_middleware};
pub use server::{
    OAuthServerState, create_oauth_routes, generate_client_secret, generate_token,
    pkce_challenge_s256,
};
pub use store::TokenStore;
pub use upstream::{UpstreamIdp, resolve_user_id};
