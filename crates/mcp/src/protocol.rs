//! JSON-RPC 2.0 message types for the MCP stdio transport.

use mcplink_core::error::ToolServerError;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<serde_json::Value, ToolServerError> {
        if let Some(err) = self.error {
            Err(ToolServerError::Rejected(format!(
                "JSON-RPC error {}: {}",
                err.code, err.message
            )))
        } else {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// `initialize` request params.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    pub client_info: ClientInfo,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "mcplink".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        }
    }
}

/// `tools/call` request params.
#[derive(Debug, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// `tools/call` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub structured_content: Option<serde_json::Value>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl ContentPart {
    /// Text for text parts, the part's JSON for anything else (images, resources).
    fn render(&self) -> String {
        match (&self.text, self.content_type.as_str()) {
            (Some(text), "text") => text.clone(),
            _ => {
                let mut part = self.rest.clone();
                part.insert("type".into(), self.content_type.clone().into());
                serde_json::Value::Object(part).to_string()
            }
        }
    }
}

impl ToolCallResult {
    /// Collapse the result into a single JSON value, or the server's error.
    ///
    /// Structured content wins when present; a single text part is parsed as
    /// JSON when it is JSON; several parts are joined with newlines.
    pub fn into_value(self) -> Result<serde_json::Value, ToolServerError> {
        let texts: Vec<String> = self.content.iter().map(ContentPart::render).collect();

        if self.is_error {
            let message = if texts.is_empty() {
                "tool reported an error".to_string()
            } else {
                texts.join("\n")
            };
            return Err(ToolServerError::Rejected(message));
        }

        if let Some(structured) = self.structured_content {
            return Ok(structured);
        }

        match texts.as_slice() {
            [single] => Ok(serde_json::from_str(single)
                .unwrap_or_else(|_| serde_json::Value::String(single.clone()))),
            parts => Ok(serde_json::Value::String(parts.join("\n"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn initialize_params_use_camel_case() {
        let json = serde_json::to_value(InitializeParams::default()).unwrap();
        assert_eq!(json["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["clientInfo"]["name"], "mcplink");
    }

    #[test]
    fn json_rpc_error_response() {
        let json =
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.to_string().contains("Method not found"));
    }

    #[test]
    fn single_text_part_parsed_as_json_when_possible() {
        let json = r#"{"content":[{"type":"text","text":"{\"temp\":21}"}]}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.into_value().unwrap()["temp"], 21);

        let json = r#"{"content":[{"type":"text","text":"2024-01-01T10:00:00+09:00"}]}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.into_value().unwrap(),
            serde_json::Value::String("2024-01-01T10:00:00+09:00".into())
        );
    }

    #[test]
    fn multiple_parts_are_joined() {
        let json = r#"{"content":[{"type":"text","text":"a"},{"type":"image","data":"AAA","mimeType":"image/png"}]}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        let value = result.into_value().unwrap();
        let text = value.as_str().unwrap();
        assert!(text.starts_with("a\n"));
        assert!(text.contains("image/png"));
    }

    #[test]
    fn error_result_is_rejected() {
        let json = r#"{"content":[{"type":"text","text":"unknown zone"}],"isError":true}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        let err = result.into_value().unwrap_err();
        assert!(matches!(err, ToolServerError::Rejected(msg) if msg == "unknown zone"));
    }

    #[test]
    fn structured_content_preferred() {
        let json = r#"{"content":[{"type":"text","text":"ignored"}],"structuredContent":{"ok":true}}"#;
        let result: ToolCallResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.into_value().unwrap()["ok"], true);
    }
}
