//! Tool-server client for mcplink.
//!
//! Launches a tool server script as a child process and talks to it over
//! newline-delimited JSON-RPC 2.0 on stdin/stdout (the MCP stdio transport).
//! The client implements `mcplink_core::ToolServer`.

pub mod client;
pub mod launch;
pub mod protocol;

pub use client::StdioToolServer;
pub use launch::ServerCommand;

use mcplink_config::ToolServerConfig;
use mcplink_core::error::ToolServerError;
use std::path::Path;
use std::time::Duration;

/// Launch the server script at `script` with the configured interpreter,
/// arguments, and environment, and complete the initialize handshake.
pub async fn connect_script(
    script: &Path,
    config: &ToolServerConfig,
) -> Result<StdioToolServer, ToolServerError> {
    let command = ServerCommand::for_script(script, config.interpreter.as_deref())?
        .with_args(config.args.iter().cloned())
        .with_env(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    StdioToolServer::spawn(&command, Duration::from_secs(config.request_timeout_secs)).await
}
