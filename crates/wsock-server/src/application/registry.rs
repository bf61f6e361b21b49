//! Registry of live sessions, keyed by [`ConnectionId`].
//!
//! # Why a channel per session?
//!
//! A session task owns its transport exclusively.  Rather than sharing the
//! write half behind a lock, the registry stores the sending side of each
//! session's command channel.  [`SessionRegistry::send`] encodes the frame and
//! queues it; the session task writes it between reads.  Every byte on a
//! connection is therefore written by one task, in queue order, and a sender
//! never waits for another connection's socket.
//!
//! # Slow peers
//!
//! Each channel holds at most [`OUTBOUND_QUEUE_CAPACITY`] commands.  A peer
//! that stops reading leaves its session blocked in a write while the queue
//! fills; the next send then evicts the session from the registry instead of
//! buffering without limit.  With its sender gone, the session writes what is
//! already queued, then closes with 1001.
//!
//! # Locking
//!
//! All operations go through one `std::sync::Mutex`.  The lock is held only
//! for map access and a non-blocking channel send, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use wsock_core::{encode_frame, encode_text, Opcode};

use crate::domain::ConnectionId;

/// A request queued for a session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Already-encoded frame bytes to write as-is.
    Frame(Vec<u8>),
    /// Send CLOSE 1001 and end the session.
    Shutdown,
}

/// Commands a session may have queued before further sends evict it.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Receiving side of a session's command channel.
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// The registry's handle on one session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    /// Creates a handle together with the receiver its session task reads.
    pub fn channel() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queues `command` without waiting.
    fn queue(&self, command: Outbound) -> Result<(), TrySendError<Outbound>> {
        self.tx.try_send(command)
    }
}

/// Process-wide map of live sessions.
///
/// Cloning is cheap and every clone sees the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<ConnectionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.  A handle already stored under `id` is replaced.
    pub fn register(&self, id: ConnectionId, handle: SessionHandle) {
        let count = {
            let mut sessions = self.lock();
            sessions.insert(id, handle);
            sessions.len()
        };
        debug!(%id, live = count, "session registered");
    }

    /// Removes a session.  Removing an unknown id is a no-op.
    pub fn unregister(&self, id: ConnectionId) {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(%id, "session unregistered");
        }
    }

    /// Queues `text` as a TEXT frame for connection `id`.
    ///
    /// Returns `false`, and sends nothing, if `id` is not a live session.
    pub fn send(&self, id: ConnectionId, text: &str) -> bool {
        self.queue_frame(id, encode_text(text))
    }

    /// Queues `data` as a BINARY frame for connection `id`.
    pub fn send_binary(&self, id: ConnectionId, data: &[u8]) -> bool {
        self.queue_frame(id, encode_frame(Opcode::Binary, data))
    }

    /// Asks one session to close with status 1001.
    ///
    /// A session whose queue is full is evicted instead, which ends it with
    /// the same status once its queue drains.
    pub fn close(&self, id: ConnectionId) -> bool {
        let mut sessions = self.lock();
        let Some(handle) = sessions.get(&id) else {
            return false;
        };
        match handle.queue(Outbound::Shutdown) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                sessions.remove(&id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Asks every live session to close with status 1001.  Returns how many
    /// sessions were signalled.
    pub fn close_all(&self) -> usize {
        let mut signalled = 0;
        self.lock()
            .retain(|_, handle| match handle.queue(Outbound::Shutdown) {
                Ok(()) => {
                    signalled += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    signalled += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => true,
            });
        signalled
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the live ids, sorted ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn queue_frame(&self, id: ConnectionId, frame: Vec<u8>) -> bool {
        let result = {
            let mut sessions = self.lock();
            let result = sessions
                .get(&id)
                .map(|handle| handle.queue(Outbound::Frame(frame)));
            if let Some(Err(TrySendError::Full(_))) = result {
                sessions.remove(&id);
            }
            result
        };
        match result {
            Some(Ok(())) => true,
            Some(Err(TrySendError::Full(_))) => {
                warn!(%id, "outbound queue full; evicting slow connection");
                false
            }
            Some(Err(TrySendError::Closed(_))) | None => {
                debug!(%id, "send to unknown or closed connection dropped");
                false
            }
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unregisters a session when dropped.
///
/// The accept path creates one per connection and moves it into the session
/// task, so the registry entry disappears however the task ends: normal
/// return, error, panic or cancellation.
#[derive(Debug)]
pub struct RegistrationGuard {
    id: ConnectionId,
    registry: SessionRegistry,
}

impl RegistrationGuard {
    pub fn new(id: ConnectionId, registry: SessionRegistry) -> Self {
        Self { id, registry }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
