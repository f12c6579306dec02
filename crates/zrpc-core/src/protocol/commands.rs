//! Typed command surface over the raw JSON-RPC layer.
//!
//! Each RPC command is a struct implementing [`CommandRequest`]: the
//! `COMMAND` string doubles as the JSON-RPC `method` and the `command`
//! discriminator inside `params`, and the associated `Response` type is
//! validated at deserialization time so a shape mismatch surfaces as a
//! protocol error instead of a type-confusion bug downstream.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// A typed RPC command with its response shape.
pub trait CommandRequest: Serialize + Send {
    /// Command discriminator, used as the JSON-RPC method name.
    const COMMAND: &'static str;
    /// Expected shape of the `result` payload.
    type Response: DeserializeOwned + Send;
}

/// Build the `params` object for a command.
///
/// The command's own fields are flattened into the object, the `command`
/// discriminator is added, and `stream` carries the request ID when a
/// local stream is attached to the request.
pub fn build_params<R: CommandRequest>(request: &R, stream_id: Option<u64>) -> Result<Value> {
    let mut params = serde_json::to_value(request).map_err(|e| Error::Protocol {
        message: format!("failed to serialize {} parameters: {e}", R::COMMAND),
    })?;
    let obj = params.as_object_mut().ok_or_else(|| Error::Protocol {
        message: format!("{} parameters must serialize to a JSON object", R::COMMAND),
    })?;
    obj.insert("command".into(), json!(R::COMMAND));
    if let Some(id) = stream_id {
        obj.insert("stream".into(), json!(id));
    }
    Ok(params)
}

/// Decode a raw `result` payload into the command's response type.
pub fn decode_result<R: CommandRequest>(result: Value) -> Result<R::Response> {
    serde_json::from_value(result).map_err(|e| Error::Protocol {
        message: format!("malformed {} response: {e}", R::COMMAND),
    })
}

// =============================================================================
// Core Commands
// =============================================================================

/// Liveness check against the remote server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ping {}

/// Response to a [`Ping`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PingResponse {
    pub success: bool,
}

impl CommandRequest for Ping {
    const COMMAND: &'static str = "ping";
    type Response = PingResponse;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_params_carry_command() {
        let params = build_params(&Ping::default(), None).unwrap();
        assert_eq!(params, json!({"command": "ping"}));
    }

    #[test]
    fn stream_id_is_added_to_params() {
        let params = build_params(&Ping::default(), Some(7)).unwrap();
        assert_eq!(params, json!({"command": "ping", "stream": 7}));
    }

    #[test]
    fn decode_ping_response() {
        let resp = decode_result::<Ping>(json!({"success": true})).unwrap();
        assert!(resp.success);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = decode_result::<Ping>(json!({"success": "yes"})).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("ping"));
    }
}
