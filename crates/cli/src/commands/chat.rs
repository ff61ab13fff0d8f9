//! `mcplink chat` — Interactive or single-message chat backed by a tool server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap::Args;
use mcplink_agent::Session;
use mcplink_config::{AppConfig, ConfigError};
use mcplink_core::error::Error;
use mcplink_core::event::DomainEvent;
use mcplink_core::provider::ReasoningEffort;
use mcplink_providers::OpenAiCompatProvider;
use tokio::sync::broadcast;
use tracing::warn;
use crate::console;

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Path to the tool server script (.py or .js)
    pub server_script: PathBuf,

    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Override the configured model
    #[arg(long)]
    pub model: Option<String>,

    /// Reasoning effort hint: low, medium, or high
    #[arg(long)]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Maximum model rounds per turn
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Print each tool call and its result
    #[arg(long)]
    pub show_tools: bool,
}

impl ChatArgs {
    /// Layer command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(effort) = self.reasoning_effort {
            config.reasoning_effort = Some(effort);
        }
        if let Some(max_rounds) = self.max_rounds {
            config.agent.max_rounds = max_rounds;
        }
        if self.show_tools {
            config.agent.show_tool_activity = true;
        }
        config.validate()
    }
}

pub async fn run(args: ChatArgs, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load_with_env(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    args.apply(&mut config)?;

    // Check for API key early — give a clear error
    let provider = match OpenAiCompatProvider::from_config(&config) {
        Ok(provider) => Arc::new(provider),
        Err(ConfigError::MissingApiKey) => {
            print_api_key_help(config_path);
            return Err("No API key found. See above for setup instructions.".into());
        }
        Err(e) => return Err(e.into()),
    };

    let mut session = Session::launch(&args.server_script, provider, &config).await?;
    let mut activity = config
        .agent
        .show_tool_activity
        .then(|| session.subscribe());

    let result = match &args.message {
        Some(message) => single_message(&mut session, message, activity.as_mut()).await,
        None => interactive(&mut session, &config, &args.server_script, activity.as_mut()).await,
    };

    // Always shut the server down, whatever ended the chat
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close tool server");
    }

    result
}

async fn single_message(
    session: &mut Session,
    message: &str,
    mut activity: Option<&mut broadcast::Receiver<Arc<DomainEvent>>>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprint!("  Thinking...");
    let outcome = tokio::select! {
        outcome = session.process_turn(message) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\r  Interrupted.");
            return Ok(());
        }
    };
    eprint!("\r              \r");
    echo_activity(activity.as_deref_mut());

    let outcome = outcome?;
    println!("{}", outcome.answer);
    Ok(())
}

async fn interactive(
    session: &mut Session,
    config: &AppConfig,
    script: &Path,
    mut activity: Option<&mut broadcast::Receiver<Arc<DomainEvent>>>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        mcplink — Interactive Mode            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Server:    {}", script.display());
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", session.catalog().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'quit', 'exit', or Ctrl+C to leave.");
    println!();

    let mut lines = console::stdin_lines();
    console::prompt()?;

    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => break,
        };

        let text = match line {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                eprintln!("  [Input Error] {e}");
                break;
            }
            // quit, exit, or EOF
            None => break,
        };

        eprint!("  ...");
        let outcome = tokio::select! {
            outcome = session.process_turn(&text) => outcome,
            _ = tokio::signal::ctrl_c() => {
                eprint!("\r     \r");
                break;
            }
        };
        eprint!("\r     \r");
        echo_activity(activity.as_deref_mut());

        match outcome {
            Ok(outcome) => console::print_answer(&outcome.answer),
            Err(e) if server_lost(&e) => {
                eprintln!("  [Error] {e}");
                return Err("The tool server is no longer running.".into());
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        console::prompt()?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Later turns cannot use tools either, so the chat ends.
fn server_lost(error: &Error) -> bool {
    matches!(error, Error::Tool(e) if e.is_fatal())
}

/// Print the tool activity buffered during the last turn.
fn echo_activity(activity: Option<&mut broadcast::Receiver<Arc<DomainEvent>>>) {
    let Some(rx) = activity else {
        return;
    };

    loop {
        match rx.try_recv() {
            Ok(event) => {
                if let Some(line) = console::describe_activity(&event) {
                    eprintln!("{line}");
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                eprintln!("  [tool] ... {skipped} events skipped");
            }
            Err(_) => break,
        }
    }
}

fn print_api_key_help(config_path: &Path) {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    MCPLINK_API_KEY = 'sk-...'   (takes precedence)");
    eprintln!("    OPENAI_API_KEY  = 'sk-...'");
    eprintln!();
    eprintln!("  Or add `api_key` to your config file:");
    eprintln!("    {}", config_path.display());
    eprintln!();
}
