//! # Wavegraph - Live Signal Server
//!
//! The main binary for the Wavegraph signal kernel.
//!
//! This application provides:
//! - HTTP/WebSocket server (axum-based live signal transport)
//! - CLI interface for node, point, and signal operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/wavegraph (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐        ┌──────────────────────────┐    │
//! │  │   CLI       │        │   HTTP + WebSocket API   │    │
//! │  │  (clap)     │        │   (axum)                 │    │
//! │  └──────┬──────┘        └────────────┬─────────────┘    │
//! │         │                            │                  │
//! │         └──────────────┬─────────────┘                  │
//! │                        ▼                                │
//! │               ┌─────────────────┐                       │
//! │               │  wavegraph-core │                       │
//! │               │   (THE LOGIC)   │                       │
//! │               └─────────────────┘                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! wavegraph serve --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! wavegraph add-point -n 1c9ba94e-3bbf-4e17-b39c-b2871ff27971
//! wavegraph snapshot -n 1c9ba94e-3bbf-4e17-b39c-b2871ff27971
//! wavegraph history -n 1c9ba94e-3bbf-4e17-b39c-b2871ff27971 --limit 10
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wavegraph::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — WAVEGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("WAVEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wavegraph=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Wavegraph startup banner.
fn print_banner() {
    println!(
        r#"
  ██╗    ██╗ █████╗ ██╗   ██╗███████╗ ██████╗ ██████╗  █████╗ ██████╗ ██╗  ██╗
  ██║    ██║██╔══██╗██║   ██║██╔════╝██╔════╝ ██╔══██╗██╔══██╗██╔══██╗██║  ██║
  ██║ █╗ ██║███████║██║   ██║█████╗  ██║  ███╗██████╔╝███████║██████╔╝███████║
  ██║███╗██║██╔══██║╚██╗ ██╔╝██╔══╝  ██║   ██║██╔══██╗██╔══██║██╔═══╝ ██╔══██║
  ╚███╔███╔╝██║  ██║ ╚████╔╝ ███████╗╚██████╔╝██║  ██║██║  ██║██║     ██║  ██║
   ╚══╝╚══╝ ╚═╝  ╚═╝  ╚═══╝  ╚══════╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝  ╚═╝

  Live Signal Server v{}

  Points in • Rhythm out • Streamed live
"#,
        env!("CARGO_PKG_VERSION")
    );
}
