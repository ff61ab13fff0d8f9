//! Executes the tool calls the model requests against the tool server.
//!
//! Every call yields a `ToolInvocationResult`, including unknown tools, bad
//! arguments, and server-side failures, so the model can see what went wrong.
//! Only a missing or lost connection is reported as an error.

use std::sync::Arc;
use mcplink_core::error::{Error, ToolError, ToolServerError};
use mcplink_core::message::MessageToolCall;
use mcplink_core::tool::{ToolCatalog, ToolInvocationResult, ToolServer};
use tracing::{debug, warn};

pub struct ToolDispatcher {
    server: Option<Arc<dyn ToolServer>>,
    catalog: ToolCatalog,
}

impl ToolDispatcher {
    pub fn new(server: Arc<dyn ToolServer>, catalog: ToolCatalog) -> Self {
        Self {
            server: Some(server),
            catalog,
        }
    }

    /// A dispatcher with no live connection. Every dispatch is fatal.
    pub fn disconnected(catalog: ToolCatalog) -> Self {
        Self {
            server: None,
            catalog,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_some()
    }

    /// Drop the connection. Later dispatches fail with `NotConnected`.
    pub fn close(&mut self) -> Option<Arc<dyn ToolServer>> {
        self.server.take()
    }

    pub async fn dispatch(&self, call: &MessageToolCall) -> Result<ToolInvocationResult, Error> {
        let Some(server) = &self.server else {
            return Err(ToolError::NotConnected.into());
        };

        if !self.catalog.contains(&call.name) {
            warn!(tool = %call.name, "Model requested an undeclared tool");
            return Ok(ToolInvocationResult::failure(
                &call.id,
                ToolError::NotFound(call.name.clone()),
            ));
        }

        let arguments = match parse_arguments(&call.name, &call.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Rejected tool arguments");
                return Ok(ToolInvocationResult::failure(&call.id, e));
            }
        };

        debug!(tool = %call.name, call_id = %call.id, "Calling tool");

        match server.call_tool(&call.name, arguments).await {
            Ok(output) => Ok(ToolInvocationResult::success(&call.id, render_output(output))),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                let error = classify(&call.name, e);
                if error.is_fatal() {
                    return Err(error.into());
                }
                Ok(ToolInvocationResult::failure(&call.id, error))
            }
        }
    }
}

/// A dead server is fatal to the turn; anything it answered with is not.
fn classify(tool_name: &str, error: ToolServerError) -> ToolError {
    if error.is_disconnect() {
        ToolError::NotConnected
    } else {
        ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: error.to_string(),
        }
    }
}

/// The model's argument text must be a JSON object; blank means no arguments.
fn parse_arguments(tool_name: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(ToolError::InvalidArguments {
            tool_name: tool_name.into(),
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(ToolError::InvalidArguments {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        }),
    }
}

fn render_output(output: serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
