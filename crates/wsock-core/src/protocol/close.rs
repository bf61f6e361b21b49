//! Close frame payloads (status code + optional reason).
//!
//! A close payload is either empty or a 2-byte big-endian status code followed
//! by a UTF-8 reason.  Control frames are limited to 125 payload bytes, which
//! leaves at most 123 bytes for the reason.

/// Well-known close status codes.
pub struct CloseCode;

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// The peer violated the framing rules.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// A frame type this endpoint does not accept (fragmented messages).
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Reported locally when a close frame carried no status code.
    pub const NO_STATUS: u16 = 1005;
    /// A text frame was not valid UTF-8.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// A frame exceeded the configured payload limit.
    pub const MESSAGE_TOO_BIG: u16 = 1009;

    /// Whether `code` may be sent in a close frame.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting; values below
    /// 1000, the unassigned 1016-2999 range and anything from 5000 up never
    /// appear on the wire.
    pub fn is_sendable(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

const MAX_REASON_LEN: usize = 123;

/// Splits a close payload into `(code, reason)`.
///
/// Payloads shorter than two bytes carry no status; they yield
/// `(CloseCode::NO_STATUS, "")`.
pub fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (code, reason)
    } else {
        (CloseCode::NO_STATUS, String::new())
    }
}

/// Builds a close payload, truncating `reason` on a character boundary so the
/// whole payload fits in a control frame.
pub fn build_close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut end = reason.len().min(MAX_REASON_LEN);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }

    let mut payload = Vec::with_capacity(2 + end);
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(&reason.as_bytes()[..end]);
    payload
}
