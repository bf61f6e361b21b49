//! Connection identity and lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier naming one accepted connection for the life of the process.
///
/// Identifiers come from an [`IdAllocator`] and are never handed out twice,
/// so a stale identifier can never address a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Thread-safe source of fresh [`ConnectionId`]s, starting at 1.
///
/// ```rust
/// use wsock_server::domain::{ConnectionId, IdAllocator};
///
/// let ids = IdAllocator::new();
/// assert_eq!(ids.next(), ConnectionId(1));
/// assert_eq!(ids.next(), ConnectionId(2));
/// ```
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a new identifier.  `Relaxed` is enough: only uniqueness matters,
    /// not ordering relative to other memory.
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a session is in its lifecycle.
///
/// ```text
/// Handshaking ──► Open ──► Closing ──► Closed
///      │            │                    ▲
///      └────────────┴── read failure ────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for (or answering) the HTTP upgrade request.
    Handshaking,
    /// Exchanging frames.
    Open,
    /// A close frame has been sent; the transport is about to be shut down.
    Closing,
    /// Terminal.  The transport is released.
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// Any state may jump straight to `Closed`; otherwise the lifecycle only
    /// moves forward one step at a time.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Handshaking, Open) | (Open, Closing) | (Handshaking | Open | Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Handshaking => "HANDSHAKING",
            SessionState::Open => "OPEN",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
