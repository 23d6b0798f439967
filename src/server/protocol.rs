//! The small slice of JSON-RPC/LSP the supervisor speaks: lifecycle only.

use serde_json::{Value, json};
use std::path::Path;
use url::Url;

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response { id: u64, body: Value },
    Request { id: Value, method: String },
    Notification { method: String, params: Option<Value> },
}

impl Incoming {
    /// Classify a decoded message. Unknown shapes yield `None`.
    pub fn classify(message: &Value) -> Option<Self> {
        let id = message.get("id");
        let method = message.get("method").and_then(Value::as_str);
        let is_reply = message.get("result").is_some() || message.get("error").is_some();

        match (id, method) {
            (Some(id), None) if is_reply => Some(Incoming::Response {
                id: id.as_u64()?,
                body: message.clone(),
            }),
            (Some(id), Some(method)) => Some(Incoming::Request {
                id: id.clone(),
                method: method.to_string(),
            }),
            (None, Some(method)) => Some(Incoming::Notification {
                method: method.to_string(),
                params: message.get("params").cloned(),
            }),
            _ => None,
        }
    }
}

pub fn request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut message = json!({ "jsonrpc": "2.0", "id": id, "method": method });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

pub fn notification(method: &str, params: Option<Value>) -> Value {
    let mut message = json!({ "jsonrpc": "2.0", "method": method });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Reply refusing a server-initiated request.
pub fn method_not_found(id: Value, method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {method}"),
        }
    })
}

/// The error message of a response, if it carries one.
pub fn response_error(response: &Value) -> Option<String> {
    let error = response.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    )
}

/// `initialize` parameters for a single-root workspace.
pub fn initialize_params(workspace_root: &Path) -> Option<Value> {
    let root_uri = Url::from_directory_path(workspace_root).ok()?;
    let name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());

    Some(json!({
        "processId": std::process::id(),
        "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
        "rootUri": root_uri.as_str(),
        "rootPath": workspace_root.to_string_lossy(),
        "capabilities": {},
        "workspaceFolders": [{ "uri": root_uri.as_str(), "name": name }],
    }))
}
