//! `initialize` / `shutdown` (spec.md §6.2 "Lifecycle").

use crate::error::{BapError, BapResult};
use crate::protocol::ProtocolVersion;
use crate::session::Session;
use serde_json::{json, Value};

pub fn initialize(session: &mut Session, params: Value) -> BapResult<Value> {
    if session.initialized {
        return Err(BapError::already_initialized());
    }

    let client_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or("1.0.0")
        .parse::<ProtocolVersion>()
        .map_err(BapError::invalid_params)?;

    if !ProtocolVersion::CURRENT.compatible_with(&client_version) {
        return Err(BapError::invalid_params(format!(
            "Protocol major version mismatch: server={}, client={}",
            ProtocolVersion::CURRENT,
            client_version
        )));
    }
    if ProtocolVersion::CURRENT.server_is_behind(&client_version) {
        tracing::warn!(client = %client_version, server = %ProtocolVersion::CURRENT, "client requests a newer minor protocol version");
    }

    session.initialized = true;

    Ok(json!({
        "protocolVersion": ProtocolVersion::CURRENT.to_string(),
        "serverInfo": {
            "name": "bap-server",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "scopes": session.scopes.iter().collect::<Vec<_>>(),
    }))
}

pub async fn shutdown(session: &mut Session) -> BapResult<Value> {
    session.shutdown().await;
    session.initialized = false;
    Ok(json!({}))
}
