//! zrpc-client: Client-side transport engine for a remote zrpcd server.
//!
//! This crate provides:
//! - SSH transport (shell channel plus exec side channels)
//! - Session bootstrap: server launch and readiness handshake
//! - Pipelined JSON-RPC request dispatch with ID correlation
//! - Response routing and per-request timeouts
//! - Stream coordination for bulk content transfers
//! - Terminal progress rendering

pub mod config;
pub mod progress_display;
pub mod session;
pub mod ssh;
pub mod streams;
pub mod transport;

mod router;

pub use config::{CloseHandler, ErrorHandler, SessionConfig, SshConfig};
pub use progress_display::TransferBar;
pub use session::{Session, SessionBuilder};
pub use ssh::{SshTransport, is_private_key_auth_failure};
pub use streams::{DownloadSink, StreamAttachment, UploadSource};
pub use transport::{ExecChannel, ShellChannel, ShellTransport};
