//! Binary codec for WebSocket frames.
//!
//! Wire format of one frame:
//! ```text
//! byte 0: [fin:1][rsv:3][opcode:4]
//! byte 1: [mask:1][len:7]
//! len == 126 -> 2-byte big-endian length follows
//! len == 127 -> 8-byte big-endian length follows
//! mask == 1  -> 4-byte masking key follows
//! payload: `length` bytes, XOR-ed with key[i % 4] when masked
//! ```
//! Client→server frames are always masked; server→client frames never are.
//! The reserved bits are ignored on decode and always written as zero.

use std::borrow::Cow;

use thiserror::Error;

/// Largest possible frame header: 2 base bytes + 8 length bytes + 4 key bytes.
pub const MAX_HEADER_LEN: usize = 14;

/// Largest payload that fits in the single-byte length field.
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Errors raised while decoding a frame.
///
/// Every variant means the bytes are not a usable frame (the "malformed
/// frame" category); the session layer decides which close code to answer with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ends before the header or payload it declares.
    #[error("truncated frame: need at least {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The low nibble of byte 0 is not one of the six defined opcodes.
    #[error("unknown opcode: 0x{0:X}")]
    UnknownOpcode(u8),

    /// The declared payload length exceeds the configured limit.
    #[error("payload length {declared} exceeds limit of {limit} bytes")]
    PayloadTooLarge { declared: u64, limit: u64 },

    /// A close, ping or pong frame that is fragmented or longer than 125 bytes.
    #[error("invalid {opcode:?} control frame (fin: {fin}, length: {len})")]
    InvalidControlFrame { opcode: Opcode, fin: bool, len: u64 },
}

// ── Opcode ────────────────────────────────────────────────────────────────────

/// The 4-bit frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Control frames (close, ping, pong) have the high bit of the nibble set.
    pub fn is_control(self) -> bool {
        (self as u8) & 0x08 != 0
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One protocol unit read from or written to the wire.
///
/// `payload` always holds the logical (unmasked) bytes; `masking_key` records
/// the key the peer used, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masking_key: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a final, unmasked frame.
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            masking_key: None,
            payload: payload.into(),
        }
    }

    /// Returns a copy of this frame that will be masked with `key` on the wire.
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.masking_key = Some(key);
        self
    }

    pub fn masked(&self) -> bool {
        self.masking_key.is_some()
    }

    pub fn payload_length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The payload interpreted as UTF-8, with invalid sequences replaced.
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Serializes the frame exactly as described by its fields, masking the
    /// payload when a key is present.
    ///
    /// The server never masks; this is what a client (or a test standing in
    /// for one) puts on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HEADER_LEN + self.payload.len());
        let fin_bit = if self.fin { 0x80 } else { 0x00 };
        buf.push(fin_bit | self.opcode as u8);

        match self.masking_key {
            Some(key) => {
                write_length(&mut buf, self.payload.len(), 0x80);
                buf.extend_from_slice(&key);
                let start = buf.len();
                buf.extend_from_slice(&self.payload);
                apply_mask(&mut buf[start..], &key);
            }
            None => {
                write_length(&mut buf, self.payload.len(), 0x00);
                buf.extend_from_slice(&self.payload);
            }
        }
        buf
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// XORs byte `i` of `payload` with `key[i % 4]`, in place.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encodes a server→client frame: FIN set, no mask, shortest length encoding.
///
/// # Examples
///
/// ```rust
/// use wsock_core::{encode_frame, Opcode};
///
/// let bytes = encode_frame(Opcode::Text, b"Hello");
/// assert_eq!(bytes, vec![0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
/// ```
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_HEADER_LEN + payload.len());
    buf.push(0x80 | opcode as u8);
    write_length(&mut buf, payload.len(), 0x00);
    buf.extend_from_slice(payload);
    buf
}

/// Encodes `text` as a single TEXT frame.
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, text.as_bytes())
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes consumed (header + payload) so
/// the caller can advance its read cursor.  The whole frame must be present;
/// use [`crate::FrameParser`] when bytes arrive in pieces.
///
/// # Errors
///
/// [`FrameError::Truncated`] when `bytes` is shorter than the header or the
/// declared payload, [`FrameError::UnknownOpcode`] for undefined opcodes.
///
/// # Examples
///
/// ```rust
/// use wsock_core::{decode_frame, encode_text, Opcode};
///
/// let bytes = encode_text("hi");
/// let (frame, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(frame.opcode, Opcode::Text);
/// assert_eq!(frame.payload, b"hi");
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameError> {
    require(bytes, 2)?;
    let head = BaseHeader::parse(bytes[0], bytes[1])?;
    let mut offset = 2;

    let ext_len = head.extended_length_size();
    require(bytes, offset + ext_len)?;
    let payload_len = head.payload_length(&bytes[offset..offset + ext_len]);
    offset += ext_len;

    let masking_key = if head.masked {
        require(bytes, offset + 4)?;
        let key = [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    // A 64-bit length can exceed the address space; such a frame can never be
    // present in full.
    let end = usize::try_from(payload_len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .ok_or(FrameError::Truncated {
            needed: usize::MAX,
            available: bytes.len(),
        })?;
    require(bytes, end)?;

    let mut payload = bytes[offset..end].to_vec();
    if let Some(key) = masking_key {
        apply_mask(&mut payload, &key);
    }

    Ok((
        Frame {
            fin: head.fin,
            opcode: head.opcode,
            masking_key,
            payload,
        },
        end,
    ))
}

// ── Header helpers (shared with the streaming parser) ─────────────────────────

/// The two fixed header bytes, unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BaseHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub length_code: u8,
}

impl BaseHeader {
    pub(crate) fn parse(b0: u8, b1: u8) -> Result<Self, FrameError> {
        // bits 6-4 of b0 are reserved and deliberately not validated
        let opcode = Opcode::try_from(b0 & 0x0F)?;
        Ok(Self {
            fin: b0 & 0x80 != 0,
            opcode,
            masked: b1 & 0x80 != 0,
            length_code: b1 & 0x7F,
        })
    }

    /// Number of extended-length bytes following the base header.
    pub(crate) fn extended_length_size(&self) -> usize {
        match self.length_code {
            126 => 2,
            127 => 8,
            _ => 0,
        }
    }

    /// Resolves the payload length; `ext` must hold `extended_length_size()` bytes.
    pub(crate) fn payload_length(&self, ext: &[u8]) -> u64 {
        match self.length_code {
            126 => u64::from(u16::from_be_bytes([ext[0], ext[1]])),
            127 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&ext[..8]);
                u64::from_be_bytes(raw)
            }
            short => u64::from(short),
        }
    }

    /// Control frames must be final and fit the single-byte length field.
    pub(crate) fn check_control(&self, payload_len: u64) -> Result<(), FrameError> {
        if self.opcode.is_control() && (!self.fin || payload_len > MAX_SHORT_PAYLOAD as u64) {
            return Err(FrameError::InvalidControlFrame {
                opcode: self.opcode,
                fin: self.fin,
                len: payload_len,
            });
        }
        Ok(())
    }
}

/// Appends the length field (base byte plus any extension).
fn write_length(buf: &mut Vec<u8>, len: usize, mask_bit: u8) {
    if len <= MAX_SHORT_PAYLOAD {
        buf.push(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.push(mask_bit | 126);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(mask_bit | 127);
        buf.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

fn require(bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
