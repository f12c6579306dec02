//! Protocol and configuration constants for zrpc.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// JSON-RPC protocol version carried in every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Notification method announcing a server-side pipe for an upload.
pub const METHOD_SEND_STREAM: &str = "sendStream";

/// Notification method announcing a server-side pipe for a download.
pub const METHOD_RECEIVE_STREAM: &str = "receiveStream";

/// Notification method reporting server-side transfer progress.
pub const METHOD_UPDATE_PROGRESS: &str = "updateProgress";

/// Server status value that completes the readiness handshake.
pub const STATUS_READY: &str = "ready";

// =============================================================================
// Server Launch Constants
// =============================================================================

/// Default directory on the remote host where the server is installed.
pub const DEFAULT_SERVER_PATH: &str = "~/.zrpc";

/// Name of the remote server binary.
pub const SERVER_BIN_NAME: &str = "zrpcd";

/// Flag appended to the launch command when a worker count is configured.
pub const NUM_WORKERS_FLAG: &str = "-num-workers";

/// Shell diagnostic marker indicating the server binary does not exist.
pub const NOT_FOUND_MARKER: &str = "FSUM7351";

/// Shell diagnostic marker for a non-fatal working-directory warning
/// emitted before the server starts. Surfaced, never fatal.
pub const CHDIR_WARNING_MARKER: &str = "FOTS1681";

// =============================================================================
// Timing Constants
// =============================================================================

/// Default per-request response timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bootstrap phase timeout (waiting for the readiness handshake).
pub const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default SSH connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Buffer Sizes
// =============================================================================

/// Read chunk size for streamed transfers (32 KiB, pre-encoding).
pub const STREAM_CHUNK_SIZE: usize = 32 * 1024;

/// Depth of the byte channels between transport pumps and the router.
pub const CHANNEL_BUFFER: usize = 64;

/// Maximum buffered partial line before the router treats the stream as
/// corrupt (16 MiB).
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_constants_are_ordered() {
        assert!(BOOTSTRAP_TIMEOUT <= DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn chunk_fits_line_limit() {
        assert!(STREAM_CHUNK_SIZE < MAX_LINE_SIZE);
    }

    #[test]
    fn launch_flag_shape() {
        assert!(NUM_WORKERS_FLAG.starts_with('-'));
        assert!(!SERVER_BIN_NAME.contains('/'));
    }
}
