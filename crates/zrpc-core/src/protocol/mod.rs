//! JSON-RPC 2.0 protocol layer.
//!
//! Wire format: one JSON object per line, newline-terminated, exchanged
//! over an interactive shell channel. Messages are classified into
//! responses (carry `id` plus `result` or `error`) and notifications
//! (carry `method` and no `id`).

pub mod codec;
pub mod commands;
pub mod types;

pub use codec::{LineBuffer, encode_line};
pub use commands::{CommandRequest, Ping, PingResponse, build_params, decode_result};
pub use types::{
    ProgressParams, RpcError, RpcMessage, RpcNotification, RpcRequest, RpcResponse, StatusMessage,
    StreamParams,
};
