//! Error types for the mcplink domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all mcplink operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool server transport errors ---
    #[error("Tool server error: {0}")]
    ToolServer(#[from] ToolServerError),

    // --- Tool dispatch errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Catalog errors ---
    #[error("Tool catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Turn loop ---
    #[error("Tool loop exceeded: no final answer after {max_rounds} model rounds")]
    ToolLoopExceeded { max_rounds: u32 },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures talking to the tool server process.
#[derive(Debug, Error)]
pub enum ToolServerError {
    #[error("Unsupported server script '{0}': expected a .py or .js file")]
    UnsupportedScript(String),

    #[error("Failed to launch tool server: {0}")]
    SpawnFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool server rejected the call: {0}")]
    Rejected(String),

    #[error("Timed out after {timeout_secs}s waiting for the tool server")]
    Timeout { timeout_secs: u64 },

    #[error("Tool server connection is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolServerError {
    /// The connection itself is gone: the process exited, its pipes broke,
    /// or the client was closed. Nothing further can be sent to it.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ToolServerError::Closed | ToolServerError::Transport(_) | ToolServerError::Io(_)
        )
    }
}

/// Failures dispatching a single tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("No tool server connection available")]
    NotConnected,
}

impl ToolError {
    /// Fatal dispatch errors abort the turn instead of being reported to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::NotConnected)
    }
}

/// A tool catalog that cannot be turned into declarations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Tool at position {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Duplicate tool name in catalog: {0}")]
    DuplicateName(String),

    #[error("Tool {name} has an invalid input schema: {reason}")]
    InvalidSchema { name: String, reason: String },
}
