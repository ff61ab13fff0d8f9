//! # mcplink Core
//!
//! Domain types, traits, and error definitions for the mcplink agent loop.
//! This crate has **no transport dependencies** — it defines the domain model
//! that the provider, tool-server, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators (the LLM service and the tool server) are
//! defined as traits here. Implementations live in their respective crates,
//! which keeps the turn loop testable with scripted stand-ins.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{CatalogError, Error, ProviderError, Result, ToolError, ToolServerError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ReasoningEffort, Usage};
pub use tool::{
    InputSchema, ToolCatalog, ToolDeclaration, ToolDescriptor, ToolInvocationResult, ToolServer,
};
