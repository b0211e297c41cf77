//! Notegate CLI - two-tier MCP bridge for note vaults
//!
//! Run with: cargo run --bin notegate -- <bridge|gateway>
//! Or after build: ./target/release/notegate <bridge|gateway>

#[tokio::main]
async fn main() {
    // Initialize logging
    notegate::init_logging();

    // Missing configuration and bind failures land here and exit non-zero
    if let Err(e) = notegate::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
