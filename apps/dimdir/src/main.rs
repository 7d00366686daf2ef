//! # Dimdir
//!
//! The binary for the Dimensional Directory document index.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                 apps/dimdir (THE BINARY)            │
//! │                                                    │
//! │   ┌─────────────┐        ┌─────────────┐           │
//! │   │    CLI      │        │  HTTP API   │           │
//! │   │   (clap)    │        │   (axum)    │           │
//! │   └──────┬──────┘        └──────┬──────┘           │
//! │          └───────────┬──────────┘                  │
//! │                      ▼                             │
//! │              ┌───────────────┐                     │
//! │              │  dimdir-core  │                     │
//! │              │ (THE ENGINE)  │                     │
//! │              └───────────────┘                     │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! dimdir server --host 0.0.0.0 --port 8080
//! dimdir ingest -f report.txt -l Report
//! dimdir resolve 'doc:<id>-0'
//! dimdir eval '=rel.count(A1)' --cell 'A1=doc:<id>-0'
//! ```

use clap::Parser;
use dimdir::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // DIMDIR_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DIMDIR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "dimdir=debug,dimdir_core=debug,tower_http=debug"
    } else {
        "dimdir=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

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

    if !cli.quiet && !cli.json_mode {
        println!("dimdir v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
