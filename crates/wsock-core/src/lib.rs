//! # wsock-core
//!
//! Protocol library for the wsock WebSocket server.  It contains the binary
//! frame codec, an incremental parser for stream transports, close-frame
//! helpers, and the HTTP upgrade handshake computation.
//!
//! This crate has zero dependencies on sockets or async runtimes: every
//! function takes bytes and returns bytes (or a typed value), which keeps the
//! bit-level logic testable without a network.
//!
//! # Architecture overview
//!
//! - **`protocol`** – How bytes travel on the wire after the upgrade.  A
//!   [`Frame`] is decoded from client bytes (undoing the XOR mask) and server
//!   messages are encoded into unmasked frames.  [`FrameParser`] buffers
//!   partial reads until a whole frame is available.
//!
//! - **`handshake`** – The one-time HTTP exchange that promotes a plain TCP
//!   connection to the framed protocol: find `Sec-WebSocket-Key`, hash it with
//!   the protocol GUID, and format the `101 Switching Protocols` response.

pub mod handshake;
pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `wsock_core::decode_frame` instead of `wsock_core::protocol::frame::decode_frame`.
pub use handshake::{compute_accept_key, negotiate, HandshakeError};
pub use protocol::close::CloseCode;
pub use protocol::frame::{apply_mask, decode_frame, encode_frame, encode_text, Frame, FrameError, Opcode};
pub use protocol::parser::FrameParser;
