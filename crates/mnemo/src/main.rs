// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mnemo - a chat assistant backend with long-term memory.
//!
//! This is the binary entry point. It loads the configuration, wires the
//! message pipeline, and exposes maintenance commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod chat;
mod stats;

use clap::{Args, Parser, Subcommand};
use mnemo_config::MnemoConfig;
use tracing_subscriber::EnvFilter;

/// Mnemo - a chat assistant backend with long-term memory.
#[derive(Parser, Debug)]
#[command(name = "mnemo", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message through the full pipeline and print the reply.
    Chat(ChatArgs),
    /// Show usage statistics.
    Stats(StatsArgs),
    /// Delete a user's chat tabs and statistics.
    Purge {
        #[arg(long)]
        user: String,
        /// Also wipe the user's stored memories.
        #[arg(long)]
        memories: bool,
    },
    /// Apply pending database migrations.
    Migrate,
    /// Print a user's settings document.
    Settings {
        #[arg(long)]
        user: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub chat_id: Option<String>,
    #[arg(long)]
    pub display_name: Option<String>,
    /// Print the reply and budget trace as JSON.
    #[arg(long)]
    pub json: bool,
    pub message: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Daily statistics of one user, newest first.
    #[arg(long, conflicts_with = "page")]
    pub user: Option<String>,
    /// Page of per-user statistics, starting at 1.
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long, default_value_t = 20)]
    pub per_page: u32,
}

fn init_tracing(config: &MnemoConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mnemo={},warn", config.agent.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match mnemo_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            mnemo_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    let result = match cli.command {
        Commands::Chat(args) => chat::run_chat(&config, args).await,
        Commands::Stats(args) => stats::run_stats(&config, args).await,
        Commands::Purge { user, memories } => admin::run_purge(&config, &user, memories).await,
        Commands::Migrate => admin::run_migrate(&config).await,
        Commands::Settings { user } => admin::run_settings(&config, &user).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
