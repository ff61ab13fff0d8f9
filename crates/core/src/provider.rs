//! Provider trait — the abstraction over the LLM completion service.
//!
//! A Provider knows how to send a conversation plus the declared tool set to
//! an LLM and get exactly one assistant reply back. Streaming is not modeled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use crate::tool::ToolDeclaration;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "o4-mini")
    pub model: String,

    /// The full conversation history
    pub messages: Vec<Message>,

    /// Tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,

    /// Reasoning-effort hint for models that support it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Sampling temperature; provider default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// How much reasoning the model should spend on a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            other => Err(format!(
                "unknown reasoning effort '{other}' (expected low, medium or high)"
            )),
        }
    }
}

/// A complete response from a provider: one assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Text content of the reply, if any
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the model, in the order listed
    #[serde(default)]
    pub tool_calls: Vec<MessageToolCall>,

    /// Token usage statistics (logged, not accounted)
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// Convert the reply into the assistant message appended to the conversation.
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The turn loop calls `complete()` without knowing which backend is being
/// used. A call is a single atomic round trip.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_effort_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ReasoningEffort>(), Ok(ReasoningEffort::High));
        assert_eq!(" low ".parse::<ReasoningEffort>(), Ok(ReasoningEffort::Low));
        assert!("extreme".parse::<ReasoningEffort>().is_err());
    }

    #[test]
    fn response_becomes_assistant_message() {
        let response = ProviderResponse {
            content: None,
            tool_calls: vec![MessageToolCall {
                id: "call_1".into(),
                name: "get_time".into(),
                arguments: r#"{"zone":"Asia/Tokyo"}"#.into(),
            }],
            usage: None,
            model: "gpt-4o".into(),
        };
        let msg = response.into_message();
        assert_eq!(msg.tool_calls().len(), 1);
        assert_eq!(msg.content(), None);
    }

    #[test]
    fn request_omits_unset_options() {
        let req = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            reasoning_effort: None,
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("reasoning_effort").is_none());
        assert!(json.get("tools").is_none());
    }
}
