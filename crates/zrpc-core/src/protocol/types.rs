//! JSON-RPC message types and classification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::JSONRPC_VERSION;
use crate::error::{Error, Result};

// =============================================================================
// Wire Messages
// =============================================================================

/// An outgoing JSON-RPC request.
///
/// The command discriminator is carried inside `params` as well as in
/// `method`, so the server can route on either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RpcRequest {
    /// Build a request with the standard protocol version.
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Error object inside a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An incoming response correlated to a pending request by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

impl RpcResponse {
    /// Content length the server claims for a streamed transfer, when the
    /// result carries one.
    pub fn content_len(&self) -> Option<u64> {
        self.result.as_ref()?.get("contentLen")?.as_u64()
    }
}

/// An incoming out-of-band notification (no `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Parameters of a `sendStream`/`receiveStream` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamParams {
    /// ID of the request this stream belongs to.
    pub id: u64,
    /// Remote pipe path the side channel reads from or writes to.
    #[serde(rename = "pipePath")]
    pub pipe_path: String,
    /// Server-side content length, when known up front.
    #[serde(rename = "contentLen", default, skip_serializing_if = "Option::is_none")]
    pub content_len: Option<u64>,
}

/// Parameters of an `updateProgress` notification, emitted periodically
/// by the server while a stream transfer is running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressParams {
    /// ID of the request the transfer belongs to.
    pub id: u64,
    /// Server-observed completion percentage.
    pub progress: u8,
}

/// First well-formed JSON object received from the server after launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

/// Server-identity data attached to the readiness handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<String>,
}

// =============================================================================
// Classification
// =============================================================================

/// A parsed inbound message, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Response(RpcResponse),
    Notification(RpcNotification),
}

impl RpcMessage {
    /// Classify a parsed JSON value as a response or notification.
    ///
    /// A message with `id` and `result` or `error` is a response; a message
    /// with `method` and no `id` is a notification. Anything else is a
    /// protocol error rather than something to drop on the floor.
    pub fn classify(value: Value) -> Result<RpcMessage> {
        let obj = value.as_object().ok_or_else(|| Error::Protocol {
            message: format!("RPC message is not a JSON object: {value}"),
        })?;

        let has_id = obj.contains_key("id");
        let has_outcome = obj.contains_key("result") || obj.contains_key("error");
        let has_method = obj.contains_key("method");

        if has_id && has_outcome {
            let response = serde_json::from_value(value.clone()).map_err(|e| Error::Protocol {
                message: format!("malformed RPC response: {e}"),
            })?;
            Ok(RpcMessage::Response(response))
        } else if has_method && !has_id {
            let notification =
                serde_json::from_value(value.clone()).map_err(|e| Error::Protocol {
                    message: format!("malformed RPC notification: {e}"),
                })?;
            Ok(RpcMessage::Notification(notification))
        } else {
            Err(Error::Protocol {
                message: format!("RPC message is neither a response nor a notification: {value}"),
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_canonically() {
        let req = RpcRequest::new("ping", json!({"command": "ping"}), 1);
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"jsonrpc":"2.0","method":"ping","params":{"command":"ping"},"id":1}"#
        );
    }

    #[test]
    fn classify_success_response() {
        let msg =
            RpcMessage::classify(json!({"jsonrpc": "2.0", "result": {"success": true}, "id": 1}))
                .unwrap();
        match msg {
            RpcMessage::Response(resp) => {
                assert_eq!(resp.id, 1);
                assert!(resp.error.is_none());
                assert_eq!(resp.result.unwrap()["success"], json!(true));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_response() {
        let msg = RpcMessage::classify(
            json!({"jsonrpc": "2.0", "error": {"code": 0, "message": "bad rpc"}, "id": 1}),
        )
        .unwrap();
        match msg {
            RpcMessage::Response(resp) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, 0);
                assert_eq!(err.message, "bad rpc");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let msg = RpcMessage::classify(json!({
            "jsonrpc": "2.0",
            "method": "sendStream",
            "params": {"id": 1, "pipePath": "/tmp/p"}
        }))
        .unwrap();
        match msg {
            RpcMessage::Notification(notif) => {
                assert_eq!(notif.method, "sendStream");
                let params: StreamParams = serde_json::from_value(notif.params).unwrap();
                assert_eq!(params.id, 1);
                assert_eq!(params.pipe_path, "/tmp/p");
                assert_eq!(params.content_len, None);
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn classify_rejects_junk() {
        assert!(RpcMessage::classify(json!("hello")).is_err());
        assert!(RpcMessage::classify(json!({"jsonrpc": "2.0"})).is_err());
        // A request shape (method + id) arriving inbound is a violation too.
        assert!(RpcMessage::classify(json!({"jsonrpc": "2.0", "method": "ping", "id": 1})).is_err());
    }

    #[test]
    fn response_content_len() {
        let resp: RpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "result": {"success": true, "contentLen": 42}, "id": 3}),
        )
        .unwrap();
        assert_eq!(resp.content_len(), Some(42));

        let resp: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": {}, "id": 3})).unwrap();
        assert_eq!(resp.content_len(), None);
    }

    #[test]
    fn status_message_with_checksums() {
        let status: StatusMessage = serde_json::from_str(
            r#"{"status": "ready", "data": {"checksums": "sha256"}}"#,
        )
        .unwrap();
        assert_eq!(status.status, "ready");
        assert_eq!(status.data.unwrap().checksums.as_deref(), Some("sha256"));
    }

    #[test]
    fn progress_params_decode() {
        let params: ProgressParams =
            serde_json::from_value(json!({"id": 3, "progress": 42})).unwrap();
        assert_eq!(params.id, 3);
        assert_eq!(params.progress, 42);
    }

    #[test]
    fn stream_params_with_content_len() {
        let params: StreamParams = serde_json::from_value(
            json!({"id": 7, "pipePath": "/tmp/pipe7", "contentLen": 1024}),
        )
        .unwrap();
        assert_eq!(params.content_len, Some(1024));
    }
}
