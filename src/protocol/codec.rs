use super::frame::{Frame, RawFrame};
use crate::error::{BapError, ErrorCode};
use serde_json::{json, Value};

/// Parse a single text frame off the wire.
///
/// On unparseable input we return a generic `BapError` rather than leaking
/// the serde parser's internal message (spec.md §4.1: "never echo parser
/// details"). The raw parse error is logged at `debug` by the caller, not
/// embedded in the response.
pub fn decode_frame(text: &str) -> Result<Frame, BapError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|_| BapError::new(ErrorCode::ParseError, "Invalid JSON-RPC message"))?;

    if raw.jsonrpc.as_deref() != Some("2.0") {
        return Err(BapError::new(
            ErrorCode::InvalidRequest,
            "Invalid JSON-RPC message",
        ));
    }

    match (raw.id, raw.method) {
        (Some(id), Some(method)) => Ok(Frame::Request {
            id,
            method,
            params: raw.params,
        }),
        (None, Some(method)) => Ok(Frame::Notification {
            method,
            params: raw.params,
        }),
        (Some(id), None) if raw.result.is_some() || raw.error.is_some() => Ok(Frame::Response {
            id,
            result: raw.result,
            error: raw.error,
        }),
        _ => Err(BapError::new(
            ErrorCode::InvalidRequest,
            "Invalid JSON-RPC message",
        )),
    }
}

pub fn encode_response_ok(id: Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

pub fn encode_response_error(id: Value, err: &BapError) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "error": err.to_json() }).to_string()
}

pub fn encode_notification(method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request() {
        let frame = decode_frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .expect("valid frame");
        match frame {
            Frame::Request { id, method, .. } => {
                assert_eq!(id, json!(1));
                assert_eq!(method, "initialize");
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn parses_notification_without_id() {
        let frame = decode_frame(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .expect("valid frame");
        assert!(matches!(frame, Frame::Notification { .. }));
    }

    #[test]
    fn garbage_input_yields_generic_parse_error() {
        let err = decode_frame("not json at all").unwrap_err();
        assert_eq!(err.message, "Invalid JSON-RPC message");
        assert_eq!(err.code.code(), ErrorCode::ParseError.code());
    }

    #[test]
    fn wrong_jsonrpc_version_is_invalid_request() {
        let err = decode_frame(r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#).unwrap_err();
        assert_eq!(err.code.code(), ErrorCode::InvalidRequest.code());
    }
}
