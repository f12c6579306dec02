//! Side-channel stream coordination.
//!
//! A request that moves bulk content registers a local stream under its
//! request ID. When the server is ready it emits a `sendStream` or
//! `receiveStream` notification naming that ID and a remote pipe path;
//! the coordinator then opens a fresh exec channel (`cat > pipe` for
//! uploads, `cat pipe` for downloads) and pumps base64 payload through
//! it, counting logical bytes for the integrity check and refreshing the
//! owning request's deadline on every chunk.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use zrpc_core::b64::{Base64Encoder, CountingBase64Decoder};
use zrpc_core::constants::{
    METHOD_RECEIVE_STREAM, METHOD_SEND_STREAM, METHOD_UPDATE_PROGRESS, STREAM_CHUNK_SIZE,
};
use zrpc_core::progress::{ProgressCallback, ProgressTracker};
use zrpc_core::protocol::{ProgressParams, RpcNotification, StreamParams};
use zrpc_core::{Error, Result, StreamDirection};

use crate::session::SessionInner;
use crate::transport::ShellTransport;

/// A local byte stream to move through the side channel.
pub type UploadSource = Box<dyn AsyncRead + Send + Unpin>;
/// A local sink receiving downloaded bytes.
pub type DownloadSink = Box<dyn AsyncWrite + Send + Unpin>;

pub enum LocalStream {
    Upload(UploadSource),
    Download(DownloadSink),
}

impl LocalStream {
    fn direction(&self) -> StreamDirection {
        match self {
            LocalStream::Upload(_) => StreamDirection::Upload,
            LocalStream::Download(_) => StreamDirection::Download,
        }
    }
}

/// A local stream plus transfer metadata, attached to one request.
pub struct StreamAttachment {
    stream: LocalStream,
    progress: Option<Arc<dyn ProgressCallback>>,
    /// Expected payload size, used for percent calculation only.
    total_bytes: Option<u64>,
    /// Human-readable name for diagnostics, e.g. a data set name.
    resource: Option<String>,
}

impl StreamAttachment {
    /// Attach a readable stream whose contents go to the server.
    pub fn upload(source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            stream: LocalStream::Upload(Box::new(source)),
            progress: None,
            total_bytes: None,
            resource: None,
        }
    }

    /// Attach a writable sink receiving content from the server.
    pub fn download(sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            stream: LocalStream::Download(Box::new(sink)),
            progress: None,
            total_bytes: None,
            resource: None,
        }
    }

    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>, total: Option<u64>) -> Self {
        self.progress = Some(callback);
        self.total_bytes = total;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>) -> Self {
        self.resource = Some(name.into());
        self
    }

    /// Callback handle for server-sent progress notifications.
    pub(crate) fn progress_handle(&self) -> Option<Arc<dyn ProgressCallback>> {
        self.progress.clone()
    }
}

// =============================================================================
// Registration
// =============================================================================

/// A registered stream parked until its notification arrives.
pub(crate) struct StreamRegistration {
    stream: LocalStream,
    progress: Option<Arc<dyn ProgressCallback>>,
    total_bytes: Option<u64>,
    resource: String,
    done: oneshot::Sender<Result<u64>>,
    deadline: Arc<Mutex<Instant>>,
}

/// The request side's handle on a registered stream.
pub(crate) struct StreamLink {
    /// Resolves with the pipeline's logical byte count.
    pub(crate) done: oneshot::Receiver<Result<u64>>,
    pub(crate) resource: String,
    pub(crate) direction: StreamDirection,
}

pub(crate) fn register(
    inner: &SessionInner,
    id: u64,
    attachment: StreamAttachment,
    deadline: Arc<Mutex<Instant>>,
) -> StreamLink {
    let (done_tx, done_rx) = oneshot::channel();
    let direction = attachment.stream.direction();
    let resource = attachment
        .resource
        .unwrap_or_else(|| format!("request #{id}"));

    inner.streams.lock().unwrap().insert(
        id,
        StreamRegistration {
            stream: attachment.stream,
            progress: attachment.progress,
            total_bytes: attachment.total_bytes,
            resource: resource.clone(),
            done: done_tx,
            deadline,
        },
    );

    StreamLink {
        done: done_rx,
        resource,
        direction,
    }
}

/// Drop a registration that will never be consumed (timeout, write
/// failure, server-side rejection).
pub(crate) fn unregister(inner: &SessionInner, id: u64) {
    inner.streams.lock().unwrap().remove(&id);
}

// =============================================================================
// Notification handling
// =============================================================================

/// Consume a stream notification: look up the registration by ID and
/// spawn the transfer pipeline against the named pipe path.
pub(crate) fn handle_notification(
    inner: &Arc<SessionInner>,
    notification: RpcNotification,
) -> Result<()> {
    let expected_direction = match notification.method.as_str() {
        METHOD_SEND_STREAM => StreamDirection::Upload,
        METHOD_RECEIVE_STREAM => StreamDirection::Download,
        METHOD_UPDATE_PROGRESS => return handle_progress(inner, notification),
        other => {
            return Err(Error::Protocol {
                message: format!("unknown notification method: {other}"),
            });
        }
    };

    let params: StreamParams =
        serde_json::from_value(notification.params).map_err(|e| Error::Protocol {
            message: format!("malformed stream notification params: {e}"),
        })?;

    let registration = inner
        .streams
        .lock()
        .unwrap()
        .remove(&params.id)
        .ok_or_else(|| Error::Protocol {
            message: format!("no stream registered for request ID {}", params.id),
        })?;

    if registration.stream.direction() != expected_direction {
        return Err(Error::Protocol {
            message: format!(
                "stream direction mismatch for request ID {}: registered {}, server asked for {}",
                params.id,
                registration.stream.direction(),
                expected_direction
            ),
        });
    }

    debug!(
        id = params.id,
        pipe_path = %params.pipe_path,
        direction = %expected_direction,
        "Starting stream pipeline"
    );

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let StreamRegistration {
            stream,
            progress,
            total_bytes,
            resource,
            done,
            deadline,
        } = registration;

        let timeout = inner.request_timeout;
        let keepalive = {
            let deadline = Arc::clone(&deadline);
            move || {
                *deadline.lock().unwrap() = Instant::now() + timeout;
            }
        };
        let tracker = ProgressTracker::new(progress, total_bytes).with_keepalive(keepalive);

        let outcome = match stream {
            LocalStream::Upload(source) => {
                upload(inner.transport.as_ref(), &params.pipe_path, source, tracker).await
            }
            LocalStream::Download(sink) => {
                download(inner.transport.as_ref(), &params.pipe_path, sink, tracker).await
            }
        };
        if let Err(err) = &outcome {
            warn!(resource = %resource, error = %err, "Stream pipeline failed");
            // Request-scoped failures reject the owning request on their
            // own; session-scoped ones also concern the session.
            if !err.is_request_scoped() {
                (inner.on_error)(err);
            }
        }
        let _ = done.send(outcome);
    });

    Ok(())
}

/// Route a server-sent progress percentage to the owning request's
/// callback. A percentage for an unknown or already-settled request is
/// dropped quietly; the server reports on a timer and can outrun the
/// response by a tick.
fn handle_progress(inner: &Arc<SessionInner>, notification: RpcNotification) -> Result<()> {
    let params: ProgressParams =
        serde_json::from_value(notification.params).map_err(|e| Error::Protocol {
            message: format!("malformed progress notification params: {e}"),
        })?;
    let callback = inner
        .pending
        .lock()
        .unwrap()
        .get(&params.id)
        .and_then(|entry| entry.progress.clone());
    match callback {
        Some(callback) => callback.on_progress(params.progress.min(100)),
        None => trace!(id = params.id, "Progress update with no listener"),
    }
    Ok(())
}

// =============================================================================
// Pipelines
// =============================================================================

/// Read local bytes, base64-encode, and feed the remote pipe through
/// `cat > path`. Returns the logical (pre-encoding) byte count.
async fn upload(
    transport: &dyn ShellTransport,
    pipe_path: &str,
    mut source: UploadSource,
    mut tracker: ProgressTracker,
) -> Result<u64> {
    let exec = transport.open_exec(&format!("cat > {pipe_path}")).await?;
    let mut encoder = Base64Encoder::new();
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        tracker.update(n);
        let encoded = encoder.update(&buf[..n]);
        if !encoded.is_empty() && exec.stdin.send(encoded).await.is_err() {
            return Err(Error::ConnectionClosed);
        }
    }

    let tail = encoder.finish();
    if !tail.is_empty() && exec.stdin.send(tail).await.is_err() {
        return Err(Error::ConnectionClosed);
    }
    // Dropping stdin closes the remote pipe's writer.
    drop(exec);
    Ok(tracker.bytes_processed())
}

/// Drain the remote pipe through `cat path`, base64-decode, and write to
/// the local sink. Returns the logical (post-decoding) byte count.
async fn download(
    transport: &dyn ShellTransport,
    pipe_path: &str,
    mut sink: DownloadSink,
    mut tracker: ProgressTracker,
) -> Result<u64> {
    let mut exec = transport.open_exec(&format!("cat {pipe_path}")).await?;
    let mut decoder = CountingBase64Decoder::new();

    while let Some(chunk) = exec.stdout.recv().await {
        let decoded = decoder.update(&chunk)?;
        // Zero-length chunks still refresh the keep-alive.
        tracker.update(decoded.len());
        if !decoded.is_empty() {
            sink.write_all(&decoded).await?;
        }
    }

    decoder.finish()?;
    sink.flush().await?;
    sink.shutdown().await?;
    Ok(decoder.bytes_written())
}
