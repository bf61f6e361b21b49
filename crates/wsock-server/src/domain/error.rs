//! Error type for server and session failures.
//!
//! Bind failures are fatal and surface from [`crate::WebSocketServer::start`].
//! Every other variant ends exactly one session and is only logged.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use wsock_core::{FrameError, HandshakeError};

#[derive(Debug, Error)]
pub enum WsError {
    /// The listener could not be bound (port in use, permission denied).
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A read or write on a connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The upgrade request was rejected.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The peer did not finish the upgrade in time.
    #[error("handshake not completed within {0:?}")]
    HandshakeTimeout(Duration),

    /// The peer sent bytes that do not form a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
}
