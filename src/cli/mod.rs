//! Command-line interface for Notegate
//!
//! Two serve commands, one per tier: `bridge` runs next to the vault,
//! `gateway` runs on the public endpoint.

use crate::bridge::notes::{NoteVault, register_note_tools};
use crate::config::{BridgeConfig, GatewayConfig};
use crate::registry::ToolRegistry;
use crate::{NotegateError, Result};
use clap::{Arg, ArgMatches, Command};
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("bridge", sub_matches)) => serve_bridge(sub_matches).await,
        Some(("gateway", _)) => {
            // Configuration problems are fatal before the listener opens
            let config = GatewayConfig::from_env()?;
            crate::gateway::start_gateway(config).await
        }
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

fn build_cli() -> Command {
    Command::new("notegate")
        .about("Notegate - two-tier MCP bridge for local note vaults")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand(
            Command::new("bridge")
                .about("Run the co-located plugin bridge (tier A)")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("Bind host (loopback by default)"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .help("Bind port"),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .value_name("KEY")
                        .env("NOTEGATE_BRIDGE_API_KEY")
                        .help("Shared API key required on /mcp"),
                ),
        )
        .subcommand(
            Command::new("gateway")
                .about("Run the remote MCP gateway (tier B), configured from NOTEGATE_* environment variables"),
        )
}

async fn serve_bridge(matches: &ArgMatches) -> Result<()> {
    let mut config = BridgeConfig::default();
    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }
    if let Some(port) = matches.get_one::<String>("port") {
        config.port = port
            .parse()
            .map_err(|_| NotegateError::config(format!("Invalid port: {}", port)))?;
    }
    config.api_key = matches.get_one::<String>("api-key").cloned();

    // The sample vault tools stand in for the host integration; the
    // scripting loader registers and unregisters through the same seam.
    let registry = Arc::new(ToolRegistry::new());
    register_note_tools(&registry, NoteVault::with_samples())?;

    crate::bridge::start_bridge(config, registry).await
}
