//! Session lifecycle and request dispatch.
//!
//! A session owns one interactive shell channel on which the remote
//! server speaks newline-delimited JSON-RPC. Requests are pipelined: each
//! gets a monotonically increasing ID, goes out through a single writer
//! task, and is parked in a pending table until the router matches a
//! response by ID. A per-request watchdog enforces the timeout; stream
//! keep-alives push the deadline forward while payload bytes are moving.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use zrpc_core::constants::{BOOTSTRAP_TIMEOUT, CHANNEL_BUFFER};
use zrpc_core::progress::ProgressCallback;
use zrpc_core::protocol::{
    CommandRequest, RpcRequest, RpcResponse, StatusMessage, build_params, decode_result,
    encode_line,
};
use zrpc_core::{Error, Result};

use crate::config::{CloseHandler, ErrorHandler, SessionConfig, SshConfig};
use crate::router;
use crate::ssh::SshTransport;
use crate::streams::{self, StreamAttachment, StreamLink};
use crate::transport::{ShellChannel, ShellTransport};

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`Session`], either over SSH or over an injected transport.
#[derive(Default)]
pub struct SessionBuilder {
    ssh: Option<SshConfig>,
    config: SessionConfig,
    transport: Option<Arc<dyn ShellTransport>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ssh(mut self, config: SshConfig) -> Self {
        self.ssh = Some(config);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a pre-built transport instead of connecting over SSH.
    pub fn transport(mut self, transport: Arc<dyn ShellTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connect, launch the remote server, and wait for its readiness
    /// handshake.
    pub async fn connect(self) -> Result<Session> {
        let transport: Arc<dyn ShellTransport> = match self.transport {
            Some(transport) => transport,
            None => {
                let ssh = self.ssh.ok_or_else(|| Error::Transport {
                    message: "no SSH configuration or transport provided".into(),
                })?;
                Arc::new(SshTransport::connect(&ssh).await?)
            }
        };

        let ShellChannel {
            stdin,
            stdout,
            stderr,
        } = transport.open_shell().await?;

        let (writer_tx, writer_rx) = mpsc::channel::<Bytes>(CHANNEL_BUFFER);
        let inner = Arc::new(SessionInner {
            pending: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            writer: writer_tx.clone(),
            transport,
            request_timeout: self.config.request_timeout,
            on_error: Arc::clone(&self.config.on_error),
            on_close: self.config.on_close.clone(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(writer_task(writer_rx, stdin));

        // The router must be consuming output before the launch line goes
        // out, or an early handshake could be dropped.
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(router::run(Arc::clone(&inner), stdout, stderr, ready_tx));

        let launch = format!("{}\n", self.config.launch_command());
        debug!(command = %launch.trim_end(), "Launching remote server");
        writer_tx
            .send(Bytes::from(launch))
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        let status = tokio::time::timeout(BOOTSTRAP_TIMEOUT, ready_rx)
            .await
            .map_err(|_| Error::Timeout {
                after: BOOTSTRAP_TIMEOUT,
            })?
            .map_err(|_| Error::ConnectionClosed)??;
        debug!(status = %status.status, "Remote server ready");

        Ok(Session { inner, status })
    }
}

// =============================================================================
// Session
// =============================================================================

/// A live RPC session against a remote server.
pub struct Session {
    inner: Arc<SessionInner>,
    status: StatusMessage,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// The readiness handshake the server sent on startup.
    pub fn server_status(&self) -> &StatusMessage {
        &self.status
    }

    /// Checksum algorithm the server advertised, if any.
    pub fn server_checksums(&self) -> Option<&str> {
        self.status.data.as_ref()?.checksums.as_deref()
    }

    /// Send a typed command and wait for its decoded response.
    pub async fn request<R: CommandRequest>(&self, request: R) -> Result<R::Response> {
        let id = self.inner.allocate_id();
        let params = build_params(&request, None)?;
        let result = self.inner.submit(id, R::COMMAND, params, None).await?;
        decode_result::<R>(result)
    }

    /// Send a typed command with an attached local stream.
    ///
    /// The request ID doubles as the stream ID: the server's follow-up
    /// `sendStream`/`receiveStream` notification names it, and the final
    /// response only resolves after the side-channel transfer completes
    /// and its byte count matches the server's `contentLen`.
    pub async fn request_with_stream<R: CommandRequest>(
        &self,
        request: R,
        attachment: StreamAttachment,
    ) -> Result<R::Response> {
        let id = self.inner.allocate_id();
        let params = build_params(&request, Some(id))?;
        let result = self
            .inner
            .submit(id, R::COMMAND, params, Some(attachment))
            .await?;
        decode_result::<R>(result)
    }

    /// Shut down the session. In-flight requests are rejected with
    /// [`Error::ConnectionClosed`] rather than left to time out.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.transport.close().await;
        self.inner.reject_all();
    }
}

// =============================================================================
// Internals
// =============================================================================

pub(crate) struct SessionInner {
    /// In-flight requests awaiting a response, keyed by request ID.
    pub(crate) pending: Mutex<HashMap<u64, PendingRequest>>,
    /// Stream registrations awaiting their notification, keyed by the
    /// owning request's ID.
    pub(crate) streams: Mutex<HashMap<u64, streams::StreamRegistration>>,
    next_id: AtomicU64,
    writer: mpsc::Sender<Bytes>,
    pub(crate) transport: Arc<dyn ShellTransport>,
    pub(crate) request_timeout: Duration,
    pub(crate) on_error: ErrorHandler,
    pub(crate) on_close: Option<CloseHandler>,
    pub(crate) closed: AtomicBool,
}

pub(crate) struct PendingRequest {
    tx: oneshot::Sender<Result<Value>>,
    /// Watchdog deadline, pushed forward by stream keep-alives.
    deadline: Arc<Mutex<Instant>>,
    stream: Option<StreamLink>,
    /// Target for server-sent `updateProgress` notifications.
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
}

impl SessionInner {
    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a pending request, write its line, and wait for the
    /// terminal outcome.
    pub(crate) async fn submit(
        self: &Arc<Self>,
        id: u64,
        method: &str,
        params: Value,
        attachment: Option<StreamAttachment>,
    ) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let deadline = Arc::new(Mutex::new(Instant::now() + self.request_timeout));
        let (tx, rx) = oneshot::channel();

        // The stream must be registered before the request hits the wire;
        // the server's notification can race the response otherwise.
        let progress = attachment.as_ref().and_then(|att| att.progress_handle());
        let link = attachment.map(|att| streams::register(self, id, att, Arc::clone(&deadline)));
        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(
                id,
                PendingRequest {
                    tx,
                    deadline: Arc::clone(&deadline),
                    stream: link,
                    progress,
                },
            );
        }

        let line = encode_line(&RpcRequest::new(method, params, id))?;
        trace!(id, method, "Dispatching request");
        if self.writer.send(Bytes::from(line)).await.is_err() {
            self.take_pending(id);
            streams::unregister(self, id);
            return Err(Error::ConnectionClosed);
        }

        self.spawn_watchdog(id, deadline);

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Route an inbound response to its pending request.
    ///
    /// A response with no pending entry (late arrival after timeout, or
    /// an ID the client never issued) is a protocol error for the session
    /// error handler.
    pub(crate) fn resolve_response(self: &Arc<Self>, response: RpcResponse) -> Result<()> {
        let entry = self
            .take_pending(response.id)
            .ok_or_else(|| Error::Protocol {
                message: format!("missing pending request for response ID {}", response.id),
            })?;

        match entry.stream {
            None => {
                let _ = entry.tx.send(outcome_of(response));
            }
            Some(link) => {
                // The response can land while the side channel is still
                // draining; the request only settles once the pipeline
                // reports its byte count.
                let inner = Arc::clone(self);
                let deadline = entry.deadline;
                tokio::spawn(async move {
                    let outcome = finish_streamed(&inner, response, link, deadline).await;
                    let _ = entry.tx.send(outcome);
                });
            }
        }
        Ok(())
    }

    pub(crate) fn take_pending(&self, id: u64) -> Option<PendingRequest> {
        self.pending.lock().unwrap().remove(&id)
    }

    fn has_pending(&self, id: u64) -> bool {
        self.pending.lock().unwrap().contains_key(&id)
    }

    /// Reject every in-flight request and drop every waiting stream
    /// registration. Used on close and on transport loss.
    pub(crate) fn reject_all(&self) {
        let pending: Vec<PendingRequest> = {
            let mut map = self.pending.lock().unwrap();
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in pending {
            let _ = entry.tx.send(Err(Error::ConnectionClosed));
        }
        self.streams.lock().unwrap().clear();
    }

    /// Fire [`Error::Timeout`] when the deadline passes without a refresh.
    fn spawn_watchdog(self: &Arc<Self>, id: u64, deadline: Arc<Mutex<Instant>>) {
        let inner = Arc::clone(self);
        let budget = self.request_timeout;
        tokio::spawn(async move {
            loop {
                let at = *deadline.lock().unwrap();
                if Instant::now() >= at {
                    if let Some(entry) = inner.take_pending(id) {
                        streams::unregister(&inner, id);
                        debug!(id, "Request timed out");
                        let _ = entry.tx.send(Err(Error::Timeout { after: budget }));
                    }
                    return;
                }
                tokio::time::sleep_until(at).await;
                if !inner.has_pending(id) {
                    return;
                }
            }
        });
    }
}

fn outcome_of(response: RpcResponse) -> Result<Value> {
    match response.error {
        Some(err) => Err(Error::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

/// Settle a streamed request: wait for the pipeline's byte count, verify
/// it against the server's `contentLen`, then surface the response.
async fn finish_streamed(
    inner: &Arc<SessionInner>,
    response: RpcResponse,
    link: StreamLink,
    deadline: Arc<Mutex<Instant>>,
) -> Result<Value> {
    if response.error.is_some() {
        // Server rejected the request; the pipeline may never start.
        streams::unregister(inner, response.id);
        return outcome_of(response);
    }

    let mut done = link.done;
    let transferred = loop {
        let at = *deadline.lock().unwrap();
        if Instant::now() >= at {
            streams::unregister(inner, response.id);
            return Err(Error::Timeout {
                after: inner.request_timeout,
            });
        }
        tokio::select! {
            result = &mut done => match result {
                Ok(count) => break count?,
                Err(_) => {
                    return Err(Error::Protocol {
                        message: format!(
                            "stream pipeline for request ID {} ended without reporting",
                            response.id
                        ),
                    });
                }
            },
            _ = tokio::time::sleep_until(at) => {}
        }
    };

    if let Some(server_len) = response.content_len() {
        let (expected, actual) = match link.direction {
            // On upload the client knows the true length; the server
            // reports what it received. On download it is the reverse.
            zrpc_core::StreamDirection::Upload => (transferred, server_len),
            zrpc_core::StreamDirection::Download => (server_len, transferred),
        };
        if expected != actual {
            return Err(Error::LengthMismatch {
                resource: link.resource,
                expected,
                actual,
                direction: link.direction,
            });
        }
    }

    outcome_of(response)
}

/// Single writer owning the shell's stdin: every outbound line goes
/// through here, so concurrent requests never interleave bytes.
async fn writer_task(mut queue: mpsc::Receiver<Bytes>, stdin: mpsc::Sender<Bytes>) {
    while let Some(chunk) = queue.recv().await {
        if stdin.send(chunk).await.is_err() {
            break;
        }
    }
}
