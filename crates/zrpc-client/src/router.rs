//! Inbound message routing.
//!
//! One task per session consumes the shell channel's stdout and stderr.
//! During startup it classifies whole chunks looking for the readiness
//! handshake; after that it reassembles newline-delimited JSON on each
//! stream independently and routes responses and notifications. Errors
//! with no request to reject go to the session error handler, and the
//! loop itself only ends when the transport closes both streams.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use zrpc_core::constants::{CHDIR_WARNING_MARKER, NOT_FOUND_MARKER, STATUS_READY};
use zrpc_core::protocol::{LineBuffer, RpcMessage, StatusMessage};
use zrpc_core::{Error, Result};

use crate::session::SessionInner;
use crate::streams;

#[derive(Clone, Copy)]
enum Source {
    Stdout,
    Stderr,
}

enum Phase {
    /// Waiting for the readiness handshake; holds the channel that
    /// resolves the bootstrap.
    Starting(Option<oneshot::Sender<Result<StatusMessage>>>),
    Ready,
}

pub(crate) async fn run(
    inner: Arc<SessionInner>,
    mut stdout: mpsc::Receiver<Bytes>,
    mut stderr: mpsc::Receiver<Bytes>,
    ready: oneshot::Sender<Result<StatusMessage>>,
) {
    let mut router = Router {
        inner,
        phase: Phase::Starting(Some(ready)),
        stdout_lines: LineBuffer::new(),
        stderr_lines: LineBuffer::new(),
    };

    let mut stdout_open = true;
    let mut stderr_open = true;
    while stdout_open || stderr_open {
        let (source, chunk) = tokio::select! {
            chunk = stdout.recv(), if stdout_open => match chunk {
                Some(chunk) => (Source::Stdout, chunk),
                None => {
                    stdout_open = false;
                    continue;
                }
            },
            chunk = stderr.recv(), if stderr_open => match chunk {
                Some(chunk) => (Source::Stderr, chunk),
                None => {
                    stderr_open = false;
                    continue;
                }
            },
        };
        router.on_chunk(source, &chunk);
    }
    router.shutdown();
}

struct Router {
    inner: Arc<SessionInner>,
    phase: Phase,
    stdout_lines: LineBuffer,
    stderr_lines: LineBuffer,
}

impl Router {
    fn on_chunk(&mut self, source: Source, chunk: &[u8]) {
        if matches!(self.phase, Phase::Ready) {
            self.on_data_chunk(source, chunk);
        } else {
            self.on_startup_chunk(chunk);
        }
    }

    /// Classify pre-handshake output. Chunks are judged whole here: the
    /// server writes its status line in one piece, and shell diagnostics
    /// are not reliably newline-terminated.
    fn on_startup_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if text.contains(NOT_FOUND_MARKER) || text.contains("command not found") {
            self.finish_startup(Err(Error::ServerNotFound {
                output: text.to_string(),
            }));
        } else if let Ok(status) = serde_json::from_str::<StatusMessage>(text) {
            if status.status == STATUS_READY {
                self.finish_startup(Ok(status));
                self.phase = Phase::Ready;
            } else {
                self.finish_startup(Err(Error::StartupFailed {
                    output: text.to_string(),
                }));
            }
        } else if text.contains(CHDIR_WARNING_MARKER) {
            // Harmless chdir diagnostic from the login shell; surface it
            // and keep waiting for the handshake.
            warn!(output = %text, "Startup warning from remote shell");
            (self.inner.on_error)(&Error::Transport {
                message: text.to_string(),
            });
        } else {
            self.finish_startup(Err(Error::StartupFailed {
                output: text.to_string(),
            }));
        }
    }

    fn finish_startup(&mut self, outcome: Result<StatusMessage>) {
        if let Phase::Starting(ready) = &mut self.phase {
            if let Some(tx) = ready.take() {
                let _ = tx.send(outcome);
                return;
            }
        }
        // Bootstrap already settled; nothing left to notify.
        trace!("Dropping post-bootstrap startup output");
    }

    fn on_data_chunk(&mut self, source: Source, chunk: &[u8]) {
        let buffer = match source {
            Source::Stdout => &mut self.stdout_lines,
            Source::Stderr => &mut self.stderr_lines,
        };
        let lines = match buffer.push(chunk) {
            Ok(lines) => lines,
            Err(err) => {
                buffer.clear();
                (self.inner.on_error)(&err);
                return;
            }
        };
        for line in lines {
            if let Err(err) = self.process_line(&line) {
                (self.inner.on_error)(&err);
            }
        }
    }

    fn process_line(&self, line: &str) -> Result<()> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|_| Error::Protocol {
                message: format!("invalid JSON response: {line}"),
            })?;
        match RpcMessage::classify(value)? {
            RpcMessage::Response(response) => {
                trace!(id = response.id, "Routing response");
                self.inner.resolve_response(response)
            }
            RpcMessage::Notification(notification) => {
                trace!(method = %notification.method, "Routing notification");
                streams::handle_notification(&self.inner, notification)
            }
        }
    }

    /// Transport closed both streams: reject everything in flight and
    /// fire the close handler exactly once.
    fn shutdown(mut self) {
        debug!("Shell channel closed, shutting down session");
        self.finish_startup(Err(Error::ConnectionClosed));
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.reject_all();
        if let Some(on_close) = &self.inner.on_close {
            on_close();
        }
    }
}
