//! Mock transport for testing without a real SSH connection.
//!
//! `mock_transport()` returns a transport to hand to a
//! [`SessionBuilder`](zrpc_client::SessionBuilder) and a [`MockServer`]
//! handle a test uses to play the remote side: read what the client
//! wrote to the shell, push stdout/stderr chunks, and serve the exec
//! channels the client opens for stream transfers.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tokio::sync::mpsc;

use zrpc_client::{ExecChannel, ShellChannel, ShellTransport};
use zrpc_core::constants::CHANNEL_BUFFER;
use zrpc_core::{Error, Result};

/// An in-memory [`ShellTransport`].
pub struct MockTransport {
    shell: StdMutex<Option<ShellChannel>>,
    execs: mpsc::Sender<MockExec>,
    closed: AtomicBool,
}

/// The remote side of a [`MockTransport`].
pub struct MockServer {
    /// Chunks the client wrote to the shell's stdin.
    pub stdin: mpsc::Receiver<Bytes>,
    /// Push chunks to the client's shell stdout.
    pub stdout: mpsc::Sender<Bytes>,
    /// Push chunks to the client's shell stderr.
    pub stderr: mpsc::Sender<Bytes>,
    /// Exec channels the client opened, in order.
    pub execs: mpsc::Receiver<MockExec>,
}

/// One exec channel as seen from the remote side.
pub struct MockExec {
    /// The command line the client ran.
    pub command: String,
    /// Bytes the client sent; closes when the client signals EOF.
    pub stdin: mpsc::Receiver<Bytes>,
    /// Push output to the client; drop to signal EOF.
    pub stdout: mpsc::Sender<Bytes>,
}

/// Create a wired-up transport/server pair.
pub fn mock_transport() -> (MockTransport, MockServer) {
    let (stdin_tx, stdin_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (stderr_tx, stderr_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (exec_tx, exec_rx) = mpsc::channel(CHANNEL_BUFFER);

    let transport = MockTransport {
        shell: StdMutex::new(Some(ShellChannel {
            stdin: stdin_tx,
            stdout: stdout_rx,
            stderr: stderr_rx,
        })),
        execs: exec_tx,
        closed: AtomicBool::new(false),
    };
    let server = MockServer {
        stdin: stdin_rx,
        stdout: stdout_tx,
        stderr: stderr_tx,
        execs: exec_rx,
    };
    (transport, server)
}

impl MockTransport {
    /// Whether `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellTransport for MockTransport {
    async fn open_shell(&self) -> Result<ShellChannel> {
        self.shell
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Transport {
                message: "mock shell channel already opened".into(),
            })
    }

    async fn open_exec(&self, command: &str) -> Result<ExecChannel> {
        let (stdin_tx, stdin_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_BUFFER);
        self.execs
            .send(MockExec {
                command: command.to_string(),
                stdin: stdin_rx,
                stdout: stdout_tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(ExecChannel {
            stdin: stdin_tx,
            stdout: stdout_rx,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MockServer {
    /// Receive one chunk of shell input as text.
    ///
    /// The client writes whole lines, so each chunk is one line.
    pub async fn recv_line(&mut self) -> Option<String> {
        self.stdin
            .recv()
            .await
            .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
    }

    /// Push a line of shell stdout, newline-terminated.
    pub async fn send_stdout(&self, text: &str) {
        let _ = self.stdout.send(Bytes::from(format!("{text}\n"))).await;
    }

    /// Push raw shell stderr output.
    pub async fn send_stderr(&self, text: &str) {
        let _ = self.stderr.send(Bytes::from(text.to_string())).await;
    }

    /// Push a JSON value as one stdout line.
    pub async fn respond(&self, message: serde_json::Value) {
        self.send_stdout(&message.to_string()).await;
    }
}

impl MockExec {
    /// Drain the client's stdin to EOF and base64-decode it.
    pub async fn read_decoded(&mut self) -> Vec<u8> {
        let mut encoded = Vec::new();
        while let Some(chunk) = self.stdin.recv().await {
            encoded.extend_from_slice(&chunk);
        }
        STANDARD.decode(&encoded).expect("valid base64 upload")
    }

    /// Base64-encode a payload and send it as the command's output,
    /// split into `chunk_size`-character chunks, then signal EOF.
    pub async fn write_encoded(self, payload: &[u8], chunk_size: usize) {
        let encoded = STANDARD.encode(payload);
        for chunk in encoded.as_bytes().chunks(chunk_size.max(1)) {
            if self.stdout.send(Bytes::copy_from_slice(chunk)).await.is_err() {
                return;
            }
        }
        // Dropping self.stdout here closes the client's reader.
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_round_trip() {
        let (transport, mut server) = mock_transport();
        let shell = transport.open_shell().await.unwrap();

        shell.stdin.send(Bytes::from("hello\n")).await.unwrap();
        assert_eq!(server.recv_line().await.unwrap(), "hello\n");

        server.send_stdout("world").await;
        let mut stdout = shell.stdout;
        assert_eq!(&stdout.recv().await.unwrap()[..], b"world\n");
    }

    #[tokio::test]
    async fn shell_opens_once() {
        let (transport, _server) = mock_transport();
        transport.open_shell().await.unwrap();
        assert!(transport.open_shell().await.is_err());
    }

    #[tokio::test]
    async fn exec_channels_reach_the_server() {
        let (transport, mut server) = mock_transport();
        let exec = transport.open_exec("cat /tmp/pipe").await.unwrap();

        let mut mock_exec = server.execs.recv().await.unwrap();
        assert_eq!(mock_exec.command, "cat /tmp/pipe");

        exec.stdin.send(Bytes::from("aGk=")).await.unwrap();
        drop(exec.stdin);
        assert_eq!(mock_exec.read_decoded().await, b"hi");
    }

    #[tokio::test]
    async fn close_is_observable() {
        let (transport, _server) = mock_transport();
        assert!(!transport.is_closed());
        transport.close().await;
        assert!(transport.is_closed());
    }
}
