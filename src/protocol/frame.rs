use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed JSON-RPC 2.0 frame, classified into one of the three shapes
/// spec.md §4.1 describes. `id` is the client-assigned integer; the server
/// never invents its own ids, it only echoes the one it was sent.
#[derive(Debug, Clone)]
pub enum Frame {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// Raw wire shape used only for serde (de)serialization; `Frame` is the
/// classified form the rest of the server works with.
#[derive(Debug, Deserialize, Serialize)]
pub(super) struct RawFrame {
    pub jsonrpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}
