//! # btec - BTEC Grading CLI
//!
//! The command-line host for the btec-core grading engine.
//!
//! This application provides:
//! - Definition authoring: check, define, validate, copy
//! - Grading: grade, show
//! - Housekeeping: init, status, prefs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              apps/btec (THE BINARY)         │
//! │                                             │
//! │   ┌──────────┐   ┌──────────┐   ┌───────┐  │
//! │   │   CLI    │   │   form   │   │ config│  │
//! │   │  (clap)  │   │ (JSON)   │   │ (toml)│  │
//! │   └────┬─────┘   └────┬─────┘   └───┬───┘  │
//! │        └──────────────┼─────────────┘      │
//! │                       ▼                    │
//! │               ┌───────────────┐            │
//! │               │   btec-core   │            │
//! │               │  (THE LOGIC)  │            │
//! │               └───────────────┘            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! btec init
//! btec define --file form.json --ready
//! btec grade --rater 3 --item 40 --file scores.json
//! btec show --rater 3 --item 40
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Initialize tracing. BTEC_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("BTEC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "btec=info".into());

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

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the btec startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ████████╗███████╗ ██████╗
  ██╔══██╗╚══██╔══╝██╔════╝██╔════╝
  ██████╔╝   ██║   █████╗  ██║
  ██╔══██╗   ██║   ██╔══╝  ██║
  ██████╔╝   ██║   ███████╗╚██████╗
  ╚═════╝    ╚═╝   ╚══════╝ ╚═════╝

  BTEC Grading Scheme v{}

  Pass • Merit • Distinction
"#,
        env!("CARGO_PKG_VERSION")
    );
}
