//! Protocol module containing the frame codec, the streaming parser and the
//! close-frame helpers.

pub mod close;
pub mod frame;
pub mod parser;

pub use close::{build_close_payload, parse_close_payload, CloseCode};
pub use frame::{apply_mask, decode_frame, encode_frame, encode_text, Frame, FrameError, Opcode};
pub use parser::FrameParser;
