//! Incremental frame parser for stream transports.
//!
//! # Why a buffer is needed
//!
//! TCP is a stream protocol.  A single `read()` may return part of a frame,
//! exactly one frame, or the tail of one frame plus the start of the next.
//! [`crate::decode_frame`] needs the whole frame in one slice, so the session
//! feeds every read into a [`FrameParser`] instead and pulls complete frames
//! out of it.
//!
//! # State machine
//!
//! ```text
//! AwaitingHeader ──► AwaitingExtendedLength ──► AwaitingMask ──► AwaitingPayload
//!       ▲                                                              │
//!       └──────────────────────── frame emitted ◄──────────────────────┘
//! ```
//!
//! Each state waits until the bytes it needs are buffered, consumes them, and
//! moves on.  A frame with a 7-bit length passes through the extended-length
//! state without consuming anything; an unmasked frame does the same in the
//! mask state.

use tracing::trace;

use crate::protocol::frame::{apply_mask, BaseHeader, Frame, FrameError};

/// Default cap on a single frame's payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
enum ParseState {
    AwaitingHeader,
    AwaitingExtendedLength {
        head: BaseHeader,
    },
    AwaitingMask {
        head: BaseHeader,
        payload_len: u64,
    },
    AwaitingPayload {
        head: BaseHeader,
        masking_key: Option<[u8; 4]>,
        payload_len: usize,
    },
}

/// Buffers transport bytes and emits complete [`Frame`]s in arrival order.
///
/// States consume bytes by advancing a read offset; the consumed prefix is
/// compacted away once per [`push`](Self::push), so a read holding many small
/// frames costs time linear in its size.
///
/// # Examples
///
/// ```rust
/// use wsock_core::{encode_text, FrameParser};
///
/// let bytes = encode_text("split me");
/// let mut parser = FrameParser::new();
///
/// parser.push(&bytes[..3]);
/// assert!(parser.next_frame().unwrap().is_none());
///
/// parser.push(&bytes[3..]);
/// let frame = parser.next_frame().unwrap().unwrap();
/// assert_eq!(frame.payload, b"split me");
/// ```
#[derive(Debug)]
pub struct FrameParser {
    buf: Vec<u8>,
    /// Start of the unconsumed bytes in `buf`.
    pos: usize,
    state: ParseState,
    max_payload: u64,
}

impl FrameParser {
    /// Creates a parser with the [`DEFAULT_MAX_PAYLOAD`] limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Creates a parser that rejects frames declaring more than `limit`
    /// payload bytes, before any of that payload is buffered.
    pub fn with_max_payload(limit: u64) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            pos: 0,
            state: ParseState::AwaitingHeader,
            max_payload: limit,
        }
    }

    /// Appends bytes received from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Number of received bytes not yet consumed by a state.
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    ///
    /// Call repeatedly after each [`push`](Self::push): one push may complete
    /// several frames.
    ///
    /// # Errors
    ///
    /// [`FrameError::UnknownOpcode`], [`FrameError::PayloadTooLarge`] or
    /// [`FrameError::InvalidControlFrame`].  The byte stream cannot be
    /// resynchronised after an error, so the parser discards its buffer and
    /// the caller should close the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let result = self.advance();
        if result.is_err() {
            self.buf.clear();
            self.pos = 0;
            self.state = ParseState::AwaitingHeader;
        }
        result
    }

    fn unconsumed(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn advance(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                ParseState::AwaitingHeader => {
                    let rest = self.unconsumed();
                    if rest.len() < 2 {
                        return Ok(None);
                    }
                    let head = BaseHeader::parse(rest[0], rest[1])?;
                    self.pos += 2;
                    self.state = ParseState::AwaitingExtendedLength { head };
                }

                ParseState::AwaitingExtendedLength { head } => {
                    let ext_len = head.extended_length_size();
                    let rest = self.unconsumed();
                    if rest.len() < ext_len {
                        return Ok(None);
                    }
                    let payload_len = head.payload_length(&rest[..ext_len]);
                    self.pos += ext_len;
                    head.check_control(payload_len)?;
                    if payload_len > self.max_payload {
                        return Err(FrameError::PayloadTooLarge {
                            declared: payload_len,
                            limit: self.max_payload,
                        });
                    }
                    self.state = ParseState::AwaitingMask { head, payload_len };
                }

                ParseState::AwaitingMask { head, payload_len } => {
                    let masking_key = if head.masked {
                        let rest = self.unconsumed();
                        if rest.len() < 4 {
                            return Ok(None);
                        }
                        let key = [rest[0], rest[1], rest[2], rest[3]];
                        self.pos += 4;
                        Some(key)
                    } else {
                        None
                    };
                    let payload_len =
                        usize::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge {
                            declared: payload_len,
                            limit: self.max_payload,
                        })?;
                    self.state = ParseState::AwaitingPayload {
                        head,
                        masking_key,
                        payload_len,
                    };
                }

                ParseState::AwaitingPayload {
                    head,
                    masking_key,
                    payload_len,
                } => {
                    let rest = self.unconsumed();
                    if rest.len() < payload_len {
                        return Ok(None);
                    }
                    let mut payload = rest[..payload_len].to_vec();
                    self.pos += payload_len;
                    if let Some(key) = masking_key {
                        apply_mask(&mut payload, &key);
                    }
                    self.state = ParseState::AwaitingHeader;

                    trace!(
                        opcode = ?head.opcode,
                        len = payload_len,
                        buffered = self.buffered_len(),
                        "frame complete"
                    );

                    return Ok(Some(Frame {
                        fin: head.fin,
                        opcode: head.opcode,
                        masking_key,
                        payload,
                    }));
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{encode_frame, encode_text, Opcode};

    fn client_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        Frame::new(opcode, payload.to_vec())
            .with_mask([0x11, 0x22, 0x33, 0x44])
            .to_bytes()
    }

    #[test]
    fn test_empty_parser_needs_more_data() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.next_frame(), Ok(None));
    }

    #[test]
    fn test_whole_frame_in_one_push() {
        // Arrange
        let mut parser = FrameParser::new();
        parser.push(&client_frame(Opcode::Text, b"hello"));

        // Act
        let frame = parser.next_frame().unwrap().expect("frame should be complete");

        // Assert
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hello");
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_one_byte_at_a_time() {
        // A masked 16-bit-length frame exercises every state.
        let payload = vec![b'z'; 300];
        let bytes = client_frame(Opcode::Binary, &payload);
        let mut parser = FrameParser::new();

        for (i, byte) in bytes.iter().enumerate() {
            parser.push(std::slice::from_ref(byte));
            let result = parser.next_frame().unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "frame emitted early at byte {i}");
            } else {
                let frame = result.expect("frame should complete on last byte");
                assert_eq!(frame.payload, payload);
            }
        }
    }

    #[test]
    fn test_split_inside_64bit_length() {
        let payload = vec![7u8; 70_000];
        let bytes = client_frame(Opcode::Binary, &payload);
        let mut parser = FrameParser::new();

        parser.push(&bytes[..5]);
        assert_eq!(parser.next_frame(), Ok(None));
        parser.push(&bytes[5..]);

        let frame = parser.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload_length(), 70_000);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_two_frames_in_one_push_emitted_in_order() {
        let mut bytes = client_frame(Opcode::Text, b"first");
        bytes.extend_from_slice(&client_frame(Opcode::Text, b"second"));
        let mut parser = FrameParser::new();
        parser.push(&bytes);

        let first = parser.next_frame().unwrap().unwrap();
        let second = parser.next_frame().unwrap().unwrap();

        assert_eq!(first.payload, b"first");
        assert_eq!(second.payload, b"second");
        assert_eq!(parser.next_frame(), Ok(None));
    }

    #[test]
    fn test_frame_tail_and_next_head_in_one_push() {
        let first = client_frame(Opcode::Text, b"alpha");
        let second = client_frame(Opcode::Text, b"beta");
        let mut parser = FrameParser::new();

        parser.push(&first[..4]);
        assert_eq!(parser.next_frame(), Ok(None));

        let mut rest = first[4..].to_vec();
        rest.extend_from_slice(&second[..3]);
        parser.push(&rest);
        assert_eq!(parser.next_frame().unwrap().unwrap().payload, b"alpha");
        assert_eq!(parser.next_frame(), Ok(None));

        parser.push(&second[3..]);
        assert_eq!(parser.next_frame().unwrap().unwrap().payload, b"beta");
    }

    #[test]
    fn test_unmasked_frames_are_accepted() {
        let mut parser = FrameParser::new();
        parser.push(&encode_text("plain"));
        let frame = parser.next_frame().unwrap().unwrap();
        assert!(!frame.masked());
        assert_eq!(frame.payload, b"plain");
    }

    #[test]
    fn test_zero_length_frame() {
        let mut parser = FrameParser::new();
        parser.push(&encode_frame(Opcode::Ping, b""));
        let frame = parser.next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Ping);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_payload_over_limit_rejected_before_buffering() {
        let mut parser = FrameParser::with_max_payload(100);
        // Only the header of a 200-byte frame has arrived.
        let bytes = client_frame(Opcode::Binary, &[0u8; 200]);
        parser.push(&bytes[..4]);

        assert_eq!(
            parser.next_frame(),
            Err(FrameError::PayloadTooLarge {
                declared: 200,
                limit: 100
            })
        );
        assert_eq!(parser.buffered_len(), 0, "buffer is discarded after an error");
    }

    #[test]
    fn test_unknown_opcode_is_an_error() {
        let mut parser = FrameParser::new();
        parser.push(&[0x8F, 0x00]);
        assert_eq!(parser.next_frame(), Err(FrameError::UnknownOpcode(0xF)));
    }

    #[test]
    fn test_oversized_ping_is_rejected() {
        // Arrange: a 200-byte ping needs the 16-bit length form
        let mut parser = FrameParser::new();
        parser.push(&client_frame(Opcode::Ping, &[0u8; 200]));

        // Act
        let result = parser.next_frame();

        // Assert
        assert_eq!(
            result,
            Err(FrameError::InvalidControlFrame {
                opcode: Opcode::Ping,
                fin: true,
                len: 200
            })
        );
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_control_frame_at_125_bytes_is_accepted() {
        let mut parser = FrameParser::new();
        parser.push(&client_frame(Opcode::Pong, &[1u8; 125]));
        let frame = parser.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload_length(), 125);
    }

    #[test]
    fn test_fragmented_close_is_rejected() {
        let mut bytes = client_frame(Opcode::Close, &[0x03, 0xE8]);
        bytes[0] &= 0x7F; // clear FIN
        let mut parser = FrameParser::new();
        parser.push(&bytes);

        assert_eq!(
            parser.next_frame(),
            Err(FrameError::InvalidControlFrame {
                opcode: Opcode::Close,
                fin: false,
                len: 2
            })
        );
    }

    #[test]
    fn test_many_small_frames_in_one_push() {
        // Arrange
        let mut bytes = Vec::new();
        for i in 0..1000u32 {
            bytes.extend_from_slice(&client_frame(Opcode::Text, i.to_string().as_bytes()));
        }
        let mut parser = FrameParser::new();
        parser.push(&bytes);

        // Act
        let mut seen = Vec::new();
        while let Some(frame) = parser.next_frame().unwrap() {
            seen.push(frame.payload);
        }

        // Assert
        assert_eq!(seen.len(), 1000);
        assert_eq!(seen[999], b"999");
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_push_compacts_consumed_bytes() {
        let first = client_frame(Opcode::Text, b"one");
        let second = client_frame(Opcode::Text, b"two");
        let mut parser = FrameParser::new();
        parser.push(&first);
        parser.push(&second[..2]);
        assert_eq!(parser.next_frame().unwrap().unwrap().payload, b"one");
        assert_eq!(parser.buffered_len(), 2);

        parser.push(&second[2..]);

        assert_eq!(parser.buf.len(), second.len(), "consumed frame was compacted away");
        assert_eq!(parser.next_frame().unwrap().unwrap().payload, b"two");
    }

    #[test]
    fn test_default_uses_default_limit() {
        let parser = FrameParser::default();
        assert_eq!(parser.max_payload, DEFAULT_MAX_PAYLOAD);
    }
}
