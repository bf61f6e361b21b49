//! One connection's lifecycle: upgrade handshake, then the frame loop.
//!
//! # Flow
//!
//! ```text
//! HANDSHAKING  read until "\r\n\r\n" (bounded by time and size)
//!      │       write 101 (or 400 and stop)
//!      ▼
//!    OPEN      loop {
//!      │         emit every complete frame buffered in the FrameParser
//!      │         select! {
//!      │           transport read  → push bytes into the parser
//!      │           command channel → write queued frame / close 1001
//!      │         }
//!      │       }
//!      ▼
//!   CLOSING    close frame written
//!      ▼
//!   CLOSED     transport shut down
//! ```
//!
//! # Single writer
//!
//! The session task is the only code that writes to its transport.  Frames
//! from [`crate::SessionRegistry::send`] arrive on the command channel and are
//! written between reads, so application writes never interleave with PONG or
//! CLOSE frames mid-frame.
//!
//! # Opcode handling
//!
//! | Frame                         | Action                                   |
//! |-------------------------------|------------------------------------------|
//! | TEXT (valid UTF-8)            | handler called with the text             |
//! | TEXT (invalid UTF-8)          | close 1007                               |
//! | BINARY                        | handler called with lossy UTF-8 text     |
//! | PING                          | PONG with the same payload               |
//! | PONG                          | ignored                                  |
//! | CLOSE                         | close echoed (same code, 1000 if none)   |
//! | CONTINUATION or `fin = 0`     | close 1003, fragments are not supported  |
//! | payload over the limit        | close 1009                               |
//! | any other framing error       | close 1002                               |

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};
use wsock_core::handshake::{bad_request_response, request_end, MAX_REQUEST_LEN};
use wsock_core::protocol::close::{build_close_payload, parse_close_payload};
use wsock_core::{
    encode_frame, negotiate, CloseCode, Frame, FrameError, FrameParser, HandshakeError, Opcode,
};

use crate::application::{HandlerSlot, Outbound, OutboundReceiver};
use crate::domain::{ConnectionId, ServerConfig, SessionState, WsError};

/// Bytes requested per transport read once the session is open.
const READ_CHUNK: usize = 4096;

/// Bytes requested per transport read while waiting for the upgrade request.
const HANDSHAKE_CHUNK: usize = 1024;

/// Per-session limits, taken from [`ServerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_payload: u64,
    pub handshake_timeout: Duration,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_payload: config.max_payload,
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Runs a session on `stream` until the peer leaves, a close completes, or an
/// error ends it.  The transport is shut down before returning.
///
/// Registry bookkeeping is the caller's job (see
/// [`crate::application::RegistrationGuard`]).
///
/// # Errors
///
/// - [`WsError::HandshakeTimeout`] if the upgrade request is not complete in time.
/// - [`WsError::Handshake`] if it is rejected (a `400` has been written).
/// - [`WsError::MalformedFrame`] if the peer sent an unparseable frame (a close
///   frame with 1002 or 1009 has been written).
/// - [`WsError::Transport`] on any read or write failure.
///
/// A peer closing the transport, or a completed close exchange, is `Ok(())`.
pub async fn run_session<S>(
    stream: S,
    id: ConnectionId,
    commands: OutboundReceiver,
    settings: SessionSettings,
    handler: Arc<HandlerSlot>,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        id,
        stream,
        parser: FrameParser::with_max_payload(settings.max_payload),
        commands,
        handler,
        state: SessionState::Handshaking,
    };

    let result = session.run(settings.handshake_timeout).await;
    session.finish().await;
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Session<S> {
    id: ConnectionId,
    stream: S,
    parser: FrameParser,
    commands: OutboundReceiver,
    handler: Arc<HandlerSlot>,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(&mut self, handshake_timeout: Duration) -> Result<(), WsError> {
        match tokio::time::timeout(handshake_timeout, self.handshake()).await {
            Ok(result) => result?,
            Err(_) => return Err(WsError::HandshakeTimeout(handshake_timeout)),
        }
        self.transition(SessionState::Open);
        info!(id = %self.id, "session open");

        self.frame_loop().await
    }

    // ── HANDSHAKING ───────────────────────────────────────────────────────────

    async fn handshake(&mut self) -> Result<(), WsError> {
        let mut request = Vec::with_capacity(HANDSHAKE_CHUNK);
        let mut chunk = [0u8; HANDSHAKE_CHUNK];

        let end = loop {
            if let Some(end) = request_end(&request) {
                break end;
            }
            if request.len() >= MAX_REQUEST_LEN {
                let error = HandshakeError::RequestTooLarge {
                    limit: MAX_REQUEST_LEN,
                };
                return Err(self.reject(error).await);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(HandshakeError::Incomplete.into());
            }
            request.extend_from_slice(&chunk[..n]);
        };

        match negotiate(&request[..end]) {
            Ok(response) => {
                self.stream.write_all(&response).await?;
                // A client may pipeline its first frames behind the request.
                self.parser.push(&request[end..]);
                Ok(())
            }
            Err(error) => Err(self.reject(error).await),
        }
    }

    /// Answers `400 Bad Request` and returns the error that ends the session.
    async fn reject(&mut self, error: HandshakeError) -> WsError {
        warn!(id = %self.id, "rejecting upgrade: {error}");
        let response = bad_request_response(&error.to_string());
        if let Err(e) = self.stream.write_all(&response).await {
            debug!(id = %self.id, "could not write 400 response: {e}");
        }
        error.into()
    }

    // ── OPEN ──────────────────────────────────────────────────────────────────

    async fn frame_loop(&mut self) -> Result<(), WsError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if self.drain_frames().await? == Flow::Stop {
                return Ok(());
            }

            // Both branches are cancel-safe: a lost `read` has consumed
            // nothing, and `recv` keeps the message queued.
            tokio::select! {
                read = self.stream.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        debug!(id = %self.id, "peer closed the transport");
                        return Ok(());
                    }
                    self.parser.push(&chunk[..n]);
                }
                command = self.commands.recv() => match command {
                    Some(Outbound::Frame(bytes)) => self.stream.write_all(&bytes).await?,
                    Some(Outbound::Shutdown) | None => {
                        self.send_close(CloseCode::GOING_AWAY, "server shutting down").await?;
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Handles every complete frame currently buffered.
    async fn drain_frames(&mut self) -> Result<Flow, WsError> {
        loop {
            let frame = match self.parser.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Flow::Continue),
                Err(error) => {
                    let code = match error {
                        FrameError::PayloadTooLarge { .. } => CloseCode::MESSAGE_TOO_BIG,
                        _ => CloseCode::PROTOCOL_ERROR,
                    };
                    warn!(id = %self.id, code, "closing on bad frame: {error}");
                    self.send_close(code, &error.to_string()).await?;
                    return Err(error.into());
                }
            };
            if self.handle_frame(frame).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Flow, WsError> {
        debug!(
            id = %self.id,
            opcode = ?frame.opcode,
            fin = frame.fin,
            len = frame.payload.len(),
            "frame received"
        );

        match frame.opcode {
            Opcode::Continuation => self.refuse_fragment().await,
            Opcode::Text | Opcode::Binary if !frame.fin => self.refuse_fragment().await,

            Opcode::Text => match std::str::from_utf8(&frame.payload) {
                Ok(text) => {
                    self.deliver(text);
                    Ok(Flow::Continue)
                }
                Err(_) => {
                    warn!(id = %self.id, "text frame is not valid UTF-8");
                    self.send_close(CloseCode::INVALID_PAYLOAD, "invalid UTF-8")
                        .await?;
                    Ok(Flow::Stop)
                }
            },

            Opcode::Binary => {
                self.deliver(&frame.as_text());
                Ok(Flow::Continue)
            }

            Opcode::Ping => {
                self.stream
                    .write_all(&encode_frame(Opcode::Pong, &frame.payload))
                    .await?;
                Ok(Flow::Continue)
            }

            Opcode::Pong => Ok(Flow::Continue),

            Opcode::Close => {
                let (code, reason) = parse_close_payload(&frame.payload);
                info!(id = %self.id, code, reason = %reason, "peer requested close");
                let reply = if frame.payload.len() < 2 {
                    CloseCode::NORMAL
                } else if CloseCode::is_sendable(code) {
                    code
                } else {
                    warn!(id = %self.id, code, "peer sent a reserved close code");
                    CloseCode::PROTOCOL_ERROR
                };
                self.send_close(reply, "").await?;
                Ok(Flow::Stop)
            }
        }
    }

    fn deliver(&self, text: &str) {
        if !self.handler.dispatch(self.id, text) {
            trace!(id = %self.id, "no handler registered; message dropped");
        }
    }

    async fn refuse_fragment(&mut self) -> Result<Flow, WsError> {
        warn!(id = %self.id, "fragmented message refused");
        self.send_close(CloseCode::UNSUPPORTED_DATA, "fragmented messages are not supported")
            .await?;
        Ok(Flow::Stop)
    }

    // ── CLOSING / CLOSED ──────────────────────────────────────────────────────

    async fn send_close(&mut self, code: u16, reason: &str) -> Result<(), WsError> {
        self.transition(SessionState::Closing);
        let frame = encode_frame(Opcode::Close, &build_close_payload(code, reason));
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn finish(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(id = %self.id, "transport shutdown failed: {e}");
        }
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            trace!(id = %self.id, from = %self.state, to = %next, "session state");
            self.state = next;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
