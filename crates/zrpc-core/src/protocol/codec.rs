//! Newline-delimited JSON framing.
//!
//! The shell channel is a free-form byte stream; RPC traffic on it is one
//! JSON object per line. `LineBuffer` reassembles lines that arrive split
//! across chunk boundaries, and `encode_line` produces the canonical
//! single-line serialization of an outgoing request.

use crate::constants::MAX_LINE_SIZE;
use crate::error::{Error, Result};
use crate::protocol::RpcRequest;

/// Accumulates raw chunks and yields complete lines.
///
/// Empty lines are skipped; a trailing `\r` is stripped so CRLF output
/// from the remote shell does not corrupt JSON parsing.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return any complete non-empty lines.
    ///
    /// Bytes after the last newline stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > MAX_LINE_SIZE {
            return Err(Error::Protocol {
                message: format!("line exceeds maximum size of {MAX_LINE_SIZE} bytes"),
            });
        }

        let mut lines = Vec::new();
        let mut start = 0;
        for i in 0..self.buf.len() {
            if self.buf[i] != b'\n' {
                continue;
            }
            let mut line = &self.buf[start..i];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
            start = i + 1;
        }
        self.buf.drain(..start);
        Ok(lines)
    }

    /// Bytes buffered past the last complete line.
    pub fn partial(&self) -> &[u8] {
        &self.buf
    }

    /// Discard any buffered partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Serialize a request as one newline-terminated line.
pub fn encode_line(request: &RpcRequest) -> Result<String> {
    let mut line = serde_json::to_string(request).map_err(|e| Error::Protocol {
        message: format!("failed to serialize request: {e}"),
    })?;
    line.push('\n');
    Ok(line)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_complete_line() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"a\":1}\n").unwrap();
        assert_eq!(lines, vec!["{\"a\":1}"]);
        assert!(buf.partial().is_empty());
    }

    #[test]
    fn line_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"jsonrpc\":").unwrap().is_empty());
        assert_eq!(buf.partial(), b"{\"jsonrpc\":");
        let lines = buf.push(b"\"2.0\"}\n").unwrap();
        assert_eq!(lines, vec!["{\"jsonrpc\":\"2.0\"}"]);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\ntwo\nthr").unwrap();
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(buf.partial(), b"thr");
        let lines = buf.push(b"ee\n").unwrap();
        assert_eq!(lines, vec!["three"]);
    }

    #[test]
    fn empty_lines_are_skipped() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"\n\n{\"ok\":true}\n\n").unwrap();
        assert_eq!(lines, vec!["{\"ok\":true}"]);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"ok\":true}\r\n").unwrap();
        assert_eq!(lines, vec!["{\"ok\":true}"]);
    }

    #[test]
    fn oversized_partial_is_an_error() {
        let mut buf = LineBuffer::new();
        let chunk = vec![b'x'; crate::constants::MAX_LINE_SIZE + 1];
        assert!(buf.push(&chunk).is_err());
    }

    #[test]
    fn encode_line_is_newline_terminated() {
        let req = RpcRequest::new("ping", json!({"command": "ping"}), 1);
        let line = encode_line(&req).unwrap();
        assert_eq!(
            line,
            "{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"params\":{\"command\":\"ping\"},\"id\":1}\n"
        );
        assert_eq!(line.matches('\n').count(), 1);
    }
}
