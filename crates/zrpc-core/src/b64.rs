//! Streaming base64 transforms with byte accounting.
//!
//! Bulk payloads cross the side-channel exec sessions base64-encoded.
//! Chunks arrive at arbitrary boundaries, so both halves carry partial
//! groups between calls: the encoder holds back up to 2 raw bytes, the
//! decoder up to 3 encoded characters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Incremental base64 encoder.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    carry: Vec<u8>,
}

impl Base64Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a chunk, returning the encoded bytes ready to send.
    ///
    /// Raw bytes that do not fill a 3-byte group are held until the next
    /// call or [`finish`](Self::finish).
    pub fn update(&mut self, chunk: &[u8]) -> Bytes {
        self.carry.extend_from_slice(chunk);
        let full = self.carry.len() / 3 * 3;
        let encoded = STANDARD.encode(&self.carry[..full]);
        self.carry.drain(..full);
        Bytes::from(encoded)
    }

    /// Encode any held-back bytes with padding.
    pub fn finish(&mut self) -> Bytes {
        let encoded = STANDARD.encode(&self.carry);
        self.carry.clear();
        Bytes::from(encoded)
    }
}

/// Incremental base64 decoder that counts decoded bytes.
///
/// ASCII whitespace is tolerated so newline-wrapped encoder output on the
/// remote side decodes cleanly.
#[derive(Debug, Default)]
pub struct CountingBase64Decoder {
    carry: Vec<u8>,
    bytes_written: u64,
}

impl CountingBase64Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning the decoded bytes.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Bytes> {
        self.carry
            .extend(chunk.iter().filter(|b| !b.is_ascii_whitespace()));
        let full = self.carry.len() / 4 * 4;
        let decoded = STANDARD
            .decode(&self.carry[..full])
            .map_err(|e| Error::Protocol {
                message: format!("invalid base64 in stream: {e}"),
            })?;
        self.carry.drain(..full);
        self.bytes_written += decoded.len() as u64;
        Ok(Bytes::from(decoded))
    }

    /// Verify the stream ended on a group boundary.
    pub fn finish(&mut self) -> Result<()> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(Error::Protocol {
                message: format!(
                    "truncated base64 stream: {} trailing characters",
                    self.carry.len()
                ),
            })
        }
    }

    /// Total decoded bytes written downstream so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Reset for reuse on a new stream.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.bytes_written = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_whole_message() {
        let mut enc = Base64Encoder::new();
        let mut out = Vec::new();
        out.extend_from_slice(&enc.update(b"hello world"));
        out.extend_from_slice(&enc.finish());
        assert_eq!(out, b"aGVsbG8gd29ybGQ=");
    }

    #[test]
    fn encode_is_chunking_invariant() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let expected = STANDARD.encode(data);

        for split in 1..data.len() {
            let mut enc = Base64Encoder::new();
            let mut out = Vec::new();
            out.extend_from_slice(&enc.update(&data[..split]));
            out.extend_from_slice(&enc.update(&data[split..]));
            out.extend_from_slice(&enc.finish());
            assert_eq!(out, expected.as_bytes(), "split at {split}");
        }
    }

    #[test]
    fn decode_counts_bytes() {
        let mut dec = CountingBase64Decoder::new();
        let decoded = dec.update(b"aGVsbG8gd29ybGQ=").unwrap();
        dec.finish().unwrap();
        assert_eq!(&decoded[..], b"hello world");
        assert_eq!(dec.bytes_written(), 11);
    }

    #[test]
    fn decode_across_chunk_boundaries() {
        let encoded = STANDARD.encode(b"some payload bytes");
        let (a, b) = encoded.as_bytes().split_at(5);

        let mut dec = CountingBase64Decoder::new();
        let mut out = Vec::new();
        out.extend_from_slice(&dec.update(a).unwrap());
        out.extend_from_slice(&dec.update(b).unwrap());
        dec.finish().unwrap();
        assert_eq!(out, b"some payload bytes");
        assert_eq!(dec.bytes_written(), 18);
    }

    #[test]
    fn decode_tolerates_whitespace() {
        let mut dec = CountingBase64Decoder::new();
        let mut out = Vec::new();
        out.extend_from_slice(&dec.update(b"aGVs\nbG8g\n").unwrap());
        out.extend_from_slice(&dec.update(b"d29y\nbGQ=\n").unwrap());
        dec.finish().unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn decode_rejects_invalid_input() {
        let mut dec = CountingBase64Decoder::new();
        assert!(dec.update(b"!!!!").is_err());
    }

    #[test]
    fn decode_rejects_truncated_stream() {
        let mut dec = CountingBase64Decoder::new();
        dec.update(b"aGVsbG").unwrap();
        assert!(dec.finish().is_err());
    }

    #[test]
    fn reset_clears_state() {
        let mut dec = CountingBase64Decoder::new();
        dec.update(b"aGVsbG8g").unwrap();
        assert!(dec.bytes_written() > 0);
        dec.reset();
        assert_eq!(dec.bytes_written(), 0);
        dec.finish().unwrap();
    }
}
