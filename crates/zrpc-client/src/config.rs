//! Session and SSH configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use zrpc_core::Error;
use zrpc_core::constants::{
    CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_PATH, NUM_WORKERS_FLAG,
    SERVER_BIN_NAME,
};

/// Handler for session-scoped errors that have no request to reject:
/// malformed inbound lines, unroutable responses, stray notifications,
/// startup warnings. The session keeps running after the handler returns.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Handler fired once when the session shuts down, whether by `close()`
/// or because the transport dropped underneath it.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

// =============================================================================
// SSH Configuration
// =============================================================================

/// Connection settings for the SSH transport.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Password authentication, tried when no private key is set.
    pub password: Option<String>,
    /// Path to a private key file for public-key authentication.
    pub private_key: Option<PathBuf>,
    /// Passphrase for an encrypted private key.
    pub key_passphrase: Option<String>,
    pub connect_timeout: Duration,
    /// SSH-level keep-alive probes; `None` disables them.
    pub keep_alive_interval: Option<Duration>,
    /// Accept unknown host keys instead of failing.
    pub skip_host_key_check: bool,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            password: None,
            private_key: None,
            key_passphrase: None,
            connect_timeout: CONNECT_TIMEOUT,
            keep_alive_interval: None,
            skip_host_key_check: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    pub fn with_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = Some(passphrase.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable SSH keep-alive probes every `seconds` seconds.
    pub fn with_keep_alive_secs(mut self, seconds: u64) -> Self {
        self.keep_alive_interval = Some(Duration::from_secs(seconds));
        self
    }

    pub fn with_skip_host_key_check(mut self, skip: bool) -> Self {
        self.skip_host_key_check = skip;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Behavior settings for a [`Session`](crate::Session).
///
/// The error handler defaults to logging through `tracing`; callers that
/// need to react to session-scoped errors install their own.
#[derive(Clone)]
pub struct SessionConfig {
    /// Remote directory holding the server binary.
    pub server_path: String,
    /// Worker-pool size passed to the server on launch.
    pub num_workers: Option<u32>,
    /// Deadline for each request, refreshed by stream keep-alives.
    pub request_timeout: Duration,
    pub on_error: ErrorHandler,
    pub on_close: Option<CloseHandler>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_path: DEFAULT_SERVER_PATH.into(),
            num_workers: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            on_error: Arc::new(|err| tracing::error!(error = %err, "unhandled session error")),
            on_close: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_path(mut self, path: impl Into<String>) -> Self {
        self.server_path = path.into();
        self
    }

    pub fn with_num_workers(mut self, workers: u32) -> Self {
        self.num_workers = Some(workers);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Request timeout in whole seconds, matching how deployment profiles
    /// usually express it.
    pub fn with_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.request_timeout = Duration::from_secs(seconds);
        self
    }

    pub fn with_error_handler(mut self, handler: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(handler);
        self
    }

    pub fn with_close_handler(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    /// Shell command that launches the remote server.
    pub fn launch_command(&self) -> String {
        let mut cmd = format!(
            "{}/{}",
            self.server_path.trim_end_matches('/'),
            SERVER_BIN_NAME
        );
        if let Some(workers) = self.num_workers {
            cmd.push_str(&format!(" {NUM_WORKERS_FLAG} {workers}"));
        }
        cmd
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("server_path", &self.server_path)
            .field("num_workers", &self.num_workers)
            .field("request_timeout", &self.request_timeout)
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_launch_command() {
        let config = SessionConfig::new();
        assert_eq!(config.launch_command(), "~/.zrpc/zrpcd");
    }

    #[test]
    fn launch_command_with_workers() {
        let config = SessionConfig::new()
            .with_server_path("/opt/zrpc/")
            .with_num_workers(8);
        assert_eq!(config.launch_command(), "/opt/zrpc/zrpcd -num-workers 8");
    }

    #[test]
    fn timeout_in_seconds() {
        let config = SessionConfig::new().with_request_timeout_secs(120);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn ssh_address_formatting() {
        let config = SshConfig::new("mainframe.example.com", "ibmuser").with_port(2022);
        assert_eq!(config.address(), "mainframe.example.com:2022");
    }
}
