//! mcplink CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Interactive or single-message chat with tools from a server script
//! - `tools`  — Launch a server script and list the tools it declares
//! - `init`   — Write a default config file

use std::path::PathBuf;
use std::process::ExitCode;
use clap::{Parser, Subcommand};
use mcplink_config::AppConfig;

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "mcplink",
    about = "mcplink — chat with an LLM that can call a local MCP tool server",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.mcplink/config.toml
    #[arg(long, global = true, env = "MCPLINK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model using the tools of a server script
    Chat(commands::chat::ChatArgs),

    /// Launch a server script and list its tools
    Tools {
        /// Path to the tool server script (.py or .js)
        server_script: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the conversation
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);

    let result = match cli.command {
        Commands::Chat(args) => commands::chat::run(args, &config_path).await,
        Commands::Tools { server_script } => commands::tools::run(&server_script, &config_path).await,
        Commands::Init { force } => commands::init::run(&config_path, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("  ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}
