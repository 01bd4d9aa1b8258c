//! gptrelay CLI: entry point.
//!
//! # Commands
//!
//! - `gptrelay serve [--config PATH] [--logs] [--json-logs]`: run the gateway
//! - `gptrelay onboard`: write a default config
//! - `gptrelay status`: show configuration and channel status

mod helpers;
mod onboard;
mod serve;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// gptrelay: one chat-completions endpoint in front of many backends
#[derive(Parser)]
#[command(name = "gptrelay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Config file (default: ~/.gptrelay/config.json)
        #[arg(short, long)]
        config: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Emit logs as JSON lines
        #[arg(long, default_value_t = false)]
        json_logs: bool,
    },

    /// Write a default configuration
    Onboard,

    /// Show configuration and channel status
    Status {
        /// Config file (default: ~/.gptrelay/config.json)
        #[arg(short, long)]
        config: Option<String>,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            logs,
            json_logs,
        } => {
            init_logging(logs, json_logs);
            serve::run(config_path(config)).await
        }
        Commands::Onboard => onboard::run(),
        Commands::Status { config } => status::run(config_path(config)),
    }
}

fn config_path(arg: Option<String>) -> Option<PathBuf> {
    arg.map(|p| helpers::expand_tilde(&p))
}

/// Initialize tracing/logging. `RUST_LOG`, when set, wins over the flags.
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "gptrelay=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
