//! Tool types and the ToolServer trait — the abstraction over the external
//! process that exposes callable, schema-described functions.
//!
//! The tool server describes its tools in its own format (`ToolDescriptor`).
//! Those descriptors are turned into `ToolDeclaration`s once per session and
//! held in an immutable `ToolCatalog` that is advertised to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use crate::error::{CatalogError, ToolServerError};
use crate::message::Message;

/// A tool as described by the tool server (`tools/list` entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Raw JSON Schema object for the tool's input
    #[serde(rename = "inputSchema", default = "default_input_schema")]
    pub input_schema: serde_json::Value,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

/// The subset of JSON Schema the model's function-calling convention needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Any other schema keywords (`$defs`, `additionalProperties`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_schema_type() -> String {
    "object".into()
}

impl InputSchema {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| default_input_schema())
    }
}

/// A callable capability advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// The tool name (unique within the session)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub input_schema: serde_json::Value,
}

/// The session's declared tool set. Ordered, name-unique, read-only.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    declarations: Arc<[ToolDeclaration]>,
}

impl ToolCatalog {
    /// Build a catalog, rejecting duplicate names.
    pub fn new(declarations: Vec<ToolDeclaration>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for decl in &declarations {
            if !seen.insert(decl.name.as_str()) {
                return Err(CatalogError::DuplicateName(decl.name.clone()));
            }
        }
        Ok(Self {
            declarations: declarations.into(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDeclaration> {
        self.declarations.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// The normalized outcome of dispatching one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    /// The call ID this result answers
    pub tool_call_id: String,

    /// Serialized tool output, or an encoded error payload
    pub content: String,

    /// Whether the tool ran successfully
    pub success: bool,
}

impl ToolInvocationResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            success: true,
        }
    }

    /// A failed invocation; the error is encoded as `{"error": "..."}` so the
    /// model can read it on the next round.
    pub fn failure(tool_call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: serde_json::json!({ "error": error.to_string() }).to_string(),
            success: false,
        }
    }

    pub fn into_message(self) -> Message {
        Message::tool_result(self.tool_call_id, self.content)
    }
}

/// A live connection to a tool server.
///
/// Implementations: stdio child process (`mcplink-mcp`), in-memory fakes in tests.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// A human-readable name for this server (usually the script path).
    fn name(&self) -> &str;

    /// Fetch the server's tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolServerError>;

    /// Invoke a tool. Server-side failures surface as `Err`.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolServerError>;

    /// Shut the connection down. Must be safe to call more than once.
    async fn close(&self) -> Result<(), ToolServerError>;
}
