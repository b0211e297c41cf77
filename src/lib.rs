//! Notegate - two-tier MCP bridge for local note vaults
//!
//! Notegate exposes a local knowledge base to Model Context Protocol
//! clients through two cooperating processes:
//! - The **plugin bridge** (tier A) runs next to the vault and serves
//!   tools over a loopback HTTP listener: the MCP streamable HTTP
//!   endpoint plus the legacy `/bridge/v1` REST surface, both backed
//!   by one tool registry.
//! - The **gateway** (tier B) runs on a public endpoint, is its own
//!   OAuth 2.1 authorization server against an upstream identity
//!   provider, and routes each authenticated MCP session to the
//!   owning user's plugin bridge.
//!
//! # Example
//!
//! ```rust,no_run
//! use notegate::bridge::notes::{NoteVault, register_note_tools};
//! use notegate::config::BridgeConfig;
//! use notegate::registry::ToolRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> notegate::Result<()> {
//!     let registry = Arc::new(ToolRegistry::new());
//!     register_note_tools(&registry, NoteVault::with_samples())?;
//!     notegate::bridge::start_bridge(BridgeConfig::default(), registry).await
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Tool registry and execution
pub mod registry;

// MCP protocol and session core (shared by both tiers)
pub mod mcp;

// Tier A: plugin bridge
pub mod bridge;

// Tier B: OAuth server and gateway
pub mod auth;
pub mod gateway;

// Infrastructure
pub mod cli;
pub mod config;

// Re-exports for convenience
pub use error::{NotegateError, Result};

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "notegate=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
