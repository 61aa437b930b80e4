//! SageChat CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive chat or single-message mode
//! - `history`  — Show or clear the saved conversation
//! - `onboard`  — Write a default config
//! - `doctor`   — Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sagechat",
    about = "SageChat — streaming chat with web search and a second-opinion critique",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Start with web search augmentation turned on
        #[arg(long)]
        web: bool,

        /// Never run the critique pass
        #[arg(long)]
        no_critique: bool,
    },

    /// Show the saved conversation
    History {
        /// Delete the saved conversation instead
        #[arg(long)]
        clear: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so streamed answers on stdout stay clean.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            web,
            no_critique,
        } => commands::chat::run(message, web, no_critique).await?,
        Commands::History { clear } => commands::history::run(clear).await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
