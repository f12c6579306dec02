//! zrpc-core: Shared library for the zrpc wire protocol and types.
//!
//! This crate provides:
//! - JSON-RPC 2.0 message definitions and newline-delimited framing
//! - Typed command request/response surface
//! - Streaming base64 transforms with byte accounting
//! - Progress tracking with percent-granularity callbacks
//! - Error types and logging setup

pub mod b64;
pub mod constants;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;

pub use error::{Error, Result, StreamDirection};
pub use logging::{LogFormat, init_logging};
