//! JSON-RPC 2.0 messages and result classification for capability workers.
//!
//! Workers speak the MCP tool-call dialect: an `initialize` handshake, an
//! `notifications/initialized` notification, then `tools/call`.

use ledgerflow_types::capability::ToolOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request. A request without `id` is a notification.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn call(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.to_string(),
            params: Some(json!({})),
        }
    }

    pub fn initialize(id: u64, client_name: &str) -> Self {
        Self::call(
            id,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": client_name,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    pub fn tool_call(id: u64, name: &str, arguments: Value) -> Self {
        Self::call(id, "tools/call", json!({ "name": name, "arguments": arguments }))
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    /// Set on worker-initiated requests and notifications, never on replies.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this message is the reply to request `id`: no `method`, the
    /// same id, and a `result` or `error` member.
    pub fn is_reply_to(&self, id: u64) -> bool {
        self.method.is_none()
            && self.id == Some(id)
            && (self.result.is_some() || self.error.is_some())
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Turn a `tools/call` response into a [`ToolOutcome`].
///
/// Application errors: a JSON-RPC error object, `isError: true`, or a payload
/// whose `status` is `"error"`. Everything else is a success whose payload is
/// `structuredContent` when present, else the text content parsed as JSON,
/// else the text itself. A response with neither `result` nor `error` is a
/// protocol fault and classifies as a transport error.
pub fn classify(response: JsonRpcResponse) -> ToolOutcome {
    if let Some(err) = response.error {
        return ToolOutcome::application_error(format!("[{}] {}", err.code, err.message));
    }

    let Some(result) = response.result else {
        return ToolOutcome::transport_error("worker response carried neither result nor error");
    };
    let text = content_text(&result);

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let message = if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text
        };
        return ToolOutcome::application_error(message);
    }

    let payload = match result.get("structuredContent") {
        Some(structured) => structured.clone(),
        None => serde_json::from_str(&text).unwrap_or(Value::String(text)),
    };

    if payload.get("status").and_then(Value::as_str) == Some("error") {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("operation reported an error")
            .to_string();
        return ToolOutcome::application_error(message);
    }

    ToolOutcome::success(payload)
}

/// Concatenated `text` items of an MCP `content` array.
fn content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
