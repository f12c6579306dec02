//! Transport abstraction between the session and the wire.
//!
//! A session needs exactly two capabilities from its transport: one
//! long-lived interactive shell channel carrying the RPC traffic, and
//! short-lived exec channels for side-channel payload transfers. Keeping
//! the seam this narrow lets tests drive a session through an in-memory
//! transport with no SSH involved.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use zrpc_core::Result;

/// Byte-stream endpoints of an interactive shell channel.
///
/// `stdout` and `stderr` deliver raw chunks as the transport produced
/// them; line framing happens above this layer. The channels close when
/// the underlying connection goes away.
pub struct ShellChannel {
    pub stdin: mpsc::Sender<Bytes>,
    pub stdout: mpsc::Receiver<Bytes>,
    pub stderr: mpsc::Receiver<Bytes>,
}

/// Byte-stream endpoints of a one-shot exec channel.
///
/// Dropping `stdin` signals EOF to the remote command.
pub struct ExecChannel {
    pub stdin: mpsc::Sender<Bytes>,
    pub stdout: mpsc::Receiver<Bytes>,
}

/// Capability to open shell and exec channels on a remote host.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Open the interactive shell channel the session runs over.
    async fn open_shell(&self) -> Result<ShellChannel>;

    /// Run `command` on a fresh exec channel.
    async fn open_exec(&self, command: &str) -> Result<ExecChannel>;

    /// Tear down the underlying connection.
    async fn close(&self);
}
