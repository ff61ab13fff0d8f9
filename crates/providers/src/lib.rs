//! LLM provider implementations for mcplink.
//!
//! All providers implement the `mcplink_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
