//! Error types for zrpc-core.

use thiserror::Error;

/// Direction of a streamed payload transfer, viewed from the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Local readable stream sent to the server.
    Upload,
    /// Server content written to a local writable stream.
    Download,
}

impl std::fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamDirection::Upload => write!(f, "upload"),
            StreamDirection::Download => write!(f, "download"),
        }
    }
}

/// Main error type for zrpc operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport layer error (SSH connect, channel open, exec).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The remote server binary was not found on the host.
    #[error("remote server not found: {output}")]
    ServerNotFound { output: String },

    /// The remote server produced unrecognized output instead of a
    /// readiness handshake.
    #[error("failed to start remote server: {output}")]
    StartupFailed { output: String },

    /// Protocol violation or malformed message.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Well-formed JSON-RPC error returned by the remote server.
    /// The message is carried verbatim; code and data are preserved
    /// for programmatic inspection.
    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Request exceeded its timeout without a response.
    #[error("request timed out after {} ms", after.as_millis())]
    Timeout { after: std::time::Duration },

    /// Streamed content length reported by the server disagrees with
    /// the bytes actually transferred.
    #[error(
        "content length mismatch for {resource} ({direction}): expected {expected} bytes, got {actual}"
    )]
    LengthMismatch {
        resource: String,
        expected: u64,
        actual: u64,
        direction: StreamDirection,
    },

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Returns true if this error is scoped to a single request.
    ///
    /// Request-scoped errors reject one in-flight request and never
    /// terminate the session. Everything else is session-scoped and flows
    /// to the session error handler (or fails bootstrap).
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Error::Rpc { .. } | Error::Timeout { .. } | Error::LengthMismatch { .. }
        )
    }

    /// Returns true if this error is a timeout, so callers can apply a
    /// different retry policy than for application errors.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error indicates the remote server binary is
    /// missing and needs to be (re)installed.
    pub fn is_server_not_found(&self) -> bool {
        matches!(self, Error::ServerNotFound { .. })
    }
}

/// Convenience result type for zrpc operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn error_display_protocol() {
        let err = Error::Protocol {
            message: "invalid JSON response: bad json".into(),
        };
        assert_eq!(
            err.to_string(),
            "protocol error: invalid JSON response: bad json"
        );
    }

    #[test]
    fn error_display_rpc_is_verbatim() {
        let err = Error::Rpc {
            code: 0,
            message: "bad rpc".into(),
            data: None,
        };
        assert_eq!(err.to_string(), "bad rpc");
    }

    #[test]
    fn error_display_timeout() {
        let err = Error::Timeout {
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "request timed out after 60000 ms");
    }

    #[test]
    fn error_display_length_mismatch() {
        let err = Error::LengthMismatch {
            resource: "MY.DATA.SET".into(),
            expected: 100,
            actual: 90,
            direction: StreamDirection::Download,
        };
        assert_eq!(
            err.to_string(),
            "content length mismatch for MY.DATA.SET (download): expected 100 bytes, got 90"
        );
    }

    #[test]
    fn request_scoped_errors() {
        assert!(Error::Rpc {
            code: 0,
            message: "bad".into(),
            data: None
        }
        .is_request_scoped());
        assert!(Error::Timeout {
            after: Duration::from_secs(1)
        }
        .is_request_scoped());
        assert!(Error::LengthMismatch {
            resource: "x".into(),
            expected: 1,
            actual: 2,
            direction: StreamDirection::Upload,
        }
        .is_request_scoped());

        // These are session-scoped
        assert!(!Error::ConnectionClosed.is_request_scoped());
        assert!(!Error::Protocol {
            message: "bad".into()
        }
        .is_request_scoped());
        assert!(!Error::AuthenticationFailed.is_request_scoped());
    }

    #[test]
    fn timeout_classification() {
        assert!(Error::Timeout {
            after: Duration::from_secs(1)
        }
        .is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
    }

    #[test]
    fn server_not_found_classification() {
        assert!(Error::ServerNotFound {
            output: "FSUM7351 not found".into()
        }
        .is_server_not_found());
        assert!(!Error::StartupFailed {
            output: "garbage".into()
        }
        .is_server_not_found());
    }
}
