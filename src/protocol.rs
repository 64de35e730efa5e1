//! Line protocol framing.
//!
//! One request per read, one response per request:
//!
//! ```text
//! Request:  ping\n
//! Response: pong\n\r
//!
//! Request:  bogus\n
//! Response: error\n\r
//! ```
//!
//! The response terminator is line-feed *then* carriage-return. Existing
//! clients depend on that order, so it is kept as is.
//!
//! Requests are not reassembled: whatever a single read of at most
//! `READ_BUFFER_SIZE` bytes returns is treated as the whole command.

use bytes::BytesMut;

/// Size of the per-connection receive buffer
pub const READ_BUFFER_SIZE: usize = 64;

/// Terminator appended to every response
pub const RESPONSE_TERMINATOR: &[u8] = b"\n\r";

/// Response for any request that is not a known command
pub const ERROR_RESPONSE: &str = "error";

/// Decode one request chunk: lossy UTF-8, surrounding whitespace removed.
pub fn decode_request(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk).trim().to_string()
}

/// Frame a response for the wire.
pub fn encode_response(response: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(response.len() + RESPONSE_TERMINATOR.len());
    buf.extend_from_slice(response.as_bytes());
    buf.extend_from_slice(RESPONSE_TERMINATOR);
    buf
}
