//! WebSocket HTTP upgrade handshake.
//!
//! The client opens with an ordinary HTTP/1.1 request carrying a random
//! 16-byte nonce in the `Sec-WebSocket-Key` header (base64, 24 characters).
//! The server proves it understood the upgrade by answering with
//!
//! ```text
//! Sec-WebSocket-Accept = base64( SHA-1( key + "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" ) )
//! ```
//!
//! inside a fixed `101 Switching Protocols` response.  Nothing else in the
//! request is interpreted: no method, version, or subprotocol checks.
//!
//! - [`negotiate`]: request bytes in, response bytes out
//! - [`compute_accept_key`]: the digest + encoding pipeline
//! - [`find_client_key`]: locate and validate the key header
//! - [`request_end`]: find the blank line that ends the request headers

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Magic GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the size of an opening request (headers included).
pub const MAX_REQUEST_LEN: usize = 8 * 1024;

const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Decoded length of a valid client key.
const KEY_NONCE_LEN: usize = 16;

/// Reasons an upgrade request cannot be answered with `101`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The peer stopped sending before the blank line ending the headers.
    #[error("connection closed before the request headers were complete")]
    Incomplete,

    /// No header terminator within [`MAX_REQUEST_LEN`] bytes.
    #[error("request exceeds {limit} bytes without a header terminator")]
    RequestTooLarge { limit: usize },

    /// The request has no `Sec-WebSocket-Key` header.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// The key header is present but is not base64 of a 16-byte nonce.
    #[error("malformed Sec-WebSocket-Key: {0:?}")]
    MalformedKey(String),
}

/// Computes the `Sec-WebSocket-Accept` token for `client_key`.
///
/// # Examples
///
/// ```rust
/// use wsock_core::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Returns the offset just past the `\r\n\r\n` that ends the request headers,
/// or `None` if the terminator has not arrived yet.
pub fn request_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Finds the `Sec-WebSocket-Key` header (name matched case-insensitively)
/// and returns its trimmed value.
///
/// # Errors
///
/// [`HandshakeError::MissingKey`] if no such header precedes the blank line,
/// [`HandshakeError::MalformedKey`] if the value is not base64 of 16 bytes.
pub fn find_client_key(request: &str) -> Result<&str, HandshakeError> {
    for line in request.split("\r\n") {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(KEY_HEADER) {
            let key = value.trim();
            return match BASE64.decode(key) {
                Ok(nonce) if nonce.len() == KEY_NONCE_LEN => Ok(key),
                _ => Err(HandshakeError::MalformedKey(key.to_string())),
            };
        }
    }
    Err(HandshakeError::MissingKey)
}

/// Produces the full `101 Switching Protocols` response for an opening request.
///
/// Writing the bytes to the transport is the caller's job.
///
/// # Errors
///
/// See [`find_client_key`].
pub fn negotiate(request: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let text = String::from_utf8_lossy(request);
    let key = find_client_key(&text)?;
    Ok(upgrade_response(&compute_accept_key(key)))
}

/// Formats the fixed upgrade response around `accept_key`.
pub fn upgrade_response(accept_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Formats a `400 Bad Request` response explaining why the upgrade failed.
pub fn bad_request_response(reason: &str) -> Vec<u8> {
    let body = format!("Bad Request: {reason}");
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}
