//! SSH transport backed by russh.
//!
//! Opens the interactive shell channel the session runs over, plus
//! short-lived exec channels for side-channel payload transfers. Each
//! channel gets a write pump and a read pump so channel I/O never blocks
//! session logic.

use std::sync::Arc;

use bytes::Bytes;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use zrpc_core::constants::CHANNEL_BUFFER;
use zrpc_core::{Error, Result};

use crate::config::SshConfig;
use crate::transport::{ExecChannel, ShellChannel, ShellTransport};

/// Substrings in SSH auth failures that point at a bad or unusable
/// private key, as opposed to a wrong password or a server-side reject.
const PRIVATE_KEY_FAILURE_PATTERNS: &[&str] = &[
    "but no passphrase given",
    "decrypt encrypted private keys",
    "empty password",
    "Failed to decrypt",
    "invalid format",
    "Unsupported key type",
];

/// Returns true if an authentication failure message indicates a problem
/// with the private key itself, so callers can prompt for a different key
/// or passphrase instead of retrying the same credentials.
pub fn is_private_key_auth_failure(message: &str) -> bool {
    PRIVATE_KEY_FAILURE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

struct SshHandler {
    skip_host_key_check: bool,
}

#[async_trait::async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if self.skip_host_key_check {
            warn!("Skipping SSH host key verification (insecure)");
        } else {
            warn!("Host key verification not implemented, accepting key");
        }
        Ok(true)
    }
}

/// SSH-backed [`ShellTransport`].
pub struct SshTransport {
    handle: Mutex<client::Handle<SshHandler>>,
}

impl SshTransport {
    /// Connect and authenticate.
    ///
    /// A private key takes precedence over a password when both are
    /// configured.
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let addr = config.address();
        debug!(addr = %addr, user = %config.user, "Connecting via SSH");

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: config.keep_alive_interval,
            keepalive_max: 3,
            ..Default::default()
        };
        let handler = SshHandler {
            skip_host_key_check: config.skip_host_key_check,
        };

        let mut handle = tokio::time::timeout(
            config.connect_timeout,
            client::connect(Arc::new(ssh_config), &addr, handler),
        )
        .await
        .map_err(|_| Error::Timeout {
            after: config.connect_timeout,
        })?
        .map_err(|e| Error::Transport {
            message: format!("SSH connection failed: {e}"),
        })?;

        let authenticated = if let Some(key_path) = &config.private_key {
            debug!(path = %key_path.display(), "Authenticating with private key");
            let key_data =
                tokio::fs::read_to_string(key_path)
                    .await
                    .map_err(|e| Error::Transport {
                        message: format!("failed to read private key: {e}"),
                    })?;
            let key_pair =
                russh_keys::decode_secret_key(&key_data, config.key_passphrase.as_deref())
                    .map_err(|e| Error::Transport {
                        message: format!("failed to decode private key: {e}"),
                    })?;
            handle
                .authenticate_publickey(&config.user, Arc::new(key_pair))
                .await
                .map_err(|e| Error::Transport {
                    message: format!("public key auth failed: {e}"),
                })?
        } else if let Some(password) = &config.password {
            handle
                .authenticate_password(&config.user, password)
                .await
                .map_err(|e| Error::Transport {
                    message: format!("password auth failed: {e}"),
                })?
        } else {
            return Err(Error::AuthenticationFailed);
        };

        if !authenticated {
            return Err(Error::AuthenticationFailed);
        }
        debug!("SSH authentication successful");

        Ok(Self {
            handle: Mutex::new(handle),
        })
    }
}

#[async_trait::async_trait]
impl ShellTransport for SshTransport {
    async fn open_shell(&self) -> Result<ShellChannel> {
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| Error::Transport {
                message: format!("failed to open SSH channel: {e}"),
            })?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| Error::Transport {
                message: format!("failed to request shell: {e}"),
            })?;

        let (stdin_tx, stdin_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (stderr_tx, stderr_rx) = mpsc::channel(CHANNEL_BUFFER);
        spawn_write_pump(channel.make_writer(), stdin_rx);
        spawn_read_pump(channel, stdout_tx, Some(stderr_tx));

        Ok(ShellChannel {
            stdin: stdin_tx,
            stdout: stdout_rx,
            stderr: stderr_rx,
        })
    }

    async fn open_exec(&self, command: &str) -> Result<ExecChannel> {
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| Error::Transport {
                message: format!("failed to open SSH channel: {e}"),
            })?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Transport {
                message: format!("failed to execute command: {e}"),
            })?;

        let (stdin_tx, stdin_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (stdout_tx, stdout_rx) = mpsc::channel(CHANNEL_BUFFER);
        spawn_write_pump(channel.make_writer(), stdin_rx);
        spawn_read_pump(channel, stdout_tx, None);

        Ok(ExecChannel {
            stdin: stdin_tx,
            stdout: stdout_rx,
        })
    }

    async fn close(&self) {
        let _ = self
            .handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "", "")
            .await;
    }
}

/// Forward queued chunks into the channel, then signal EOF when the
/// sender side is dropped.
fn spawn_write_pump<W>(mut writer: W, mut stdin_rx: mpsc::Receiver<Bytes>)
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(chunk) = stdin_rx.recv().await {
            if writer.write_all(&chunk).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });
}

/// Forward channel output into byte channels until the channel closes.
fn spawn_read_pump(
    mut channel: russh::Channel<client::Msg>,
    stdout_tx: mpsc::Sender<Bytes>,
    stderr_tx: Option<mpsc::Sender<Bytes>>,
) {
    tokio::spawn(async move {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    if stdout_tx.send(Bytes::copy_from_slice(&data)).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => match &stderr_tx {
                    Some(tx) => {
                        if tx.send(Bytes::copy_from_slice(&data)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!(stderr = %String::from_utf8_lossy(&data), "exec stderr");
                    }
                },
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "remote command exited");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_failure_detection() {
        assert!(is_private_key_auth_failure(
            "key is encrypted but no passphrase given"
        ));
        assert!(is_private_key_auth_failure(
            "Failed to decrypt private key"
        ));
        assert!(!is_private_key_auth_failure("permission denied"));
    }
}
