//! The application's message callback.
//!
//! Exactly one [`MessageHandler`] is active per server.  It is called from the
//! session task of whichever connection received the message, so several
//! sessions may call it at the same time: implementations must be
//! `Send + Sync` and must not assume calls are serialised.
//!
//! Handlers are synchronous.  Replying from inside a handler through
//! [`crate::SessionRegistry::send`] only queues the frame, so a handler that
//! answers its own connection never waits on that connection's socket.

use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::ConnectionId;

/// Receives every application message, tagged with the connection it came from.
#[cfg_attr(test, mockall::automock)]
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, id: ConnectionId, text: &str);
}

/// Any `Fn(ConnectionId, &str)` closure is a handler.
impl<F> MessageHandler for F
where
    F: Fn(ConnectionId, &str) + Send + Sync,
{
    fn on_message(&self, id: ConnectionId, text: &str) {
        self(id, text)
    }
}

/// Holds the currently registered handler.
///
/// Registering replaces the previous handler (last registration wins), and
/// may happen while sessions are running: each dispatch picks up whichever
/// handler is current at that moment.  Messages arriving while no handler is
/// registered are dropped.
#[derive(Default)]
pub struct HandlerSlot {
    current: RwLock<Option<Arc<dyn MessageHandler>>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, replacing any previous one.
    pub fn set(&self, handler: Arc<dyn MessageHandler>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(handler);
    }

    pub fn is_set(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Calls the current handler, if any.  Returns `false` when the message
    /// was dropped because no handler is registered.
    ///
    /// The lock is released before the handler runs, so a handler may itself
    /// register a replacement.
    pub fn dispatch(&self, id: ConnectionId, text: &str) -> bool {
        let handler = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => {
                handler.on_message(id, text);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("is_set", &self.is_set())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_empty_slot_drops_messages() {
        let slot = HandlerSlot::new();
        assert!(!slot.is_set());
        assert!(!slot.dispatch(ConnectionId(1), "ignored"));
    }

    #[test]
    fn test_closure_is_a_handler() {
        // Arrange
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let slot = HandlerSlot::new();
        slot.set(Arc::new(move |id: ConnectionId, text: &str| {
            sink.lock().unwrap().push((id, text.to_string()));
        }));

        // Act
        let delivered = slot.dispatch(ConnectionId(3), "hello");

        // Assert
        assert!(delivered);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ConnectionId(3), "hello".to_string())]
        );
    }

    #[test]
    fn test_mock_handler_receives_id_and_text() {
        let mut mock = MockMessageHandler::new();
        mock.expect_on_message()
            .withf(|id, text| *id == ConnectionId(9) && text == "payload")
            .times(1)
            .return_const(());

        let slot = HandlerSlot::new();
        slot.set(Arc::new(mock));

        assert!(slot.dispatch(ConnectionId(9), "payload"));
    }

    #[test]
    fn test_last_registration_wins() {
        // Arrange: the first handler must never be called once replaced
        let mut first = MockMessageHandler::new();
        first.expect_on_message().never();
        let mut second = MockMessageHandler::new();
        second.expect_on_message().times(2).return_const(());

        let slot = HandlerSlot::new();
        slot.set(Arc::new(first));
        slot.set(Arc::new(second));

        // Act
        slot.dispatch(ConnectionId(1), "a");
        slot.dispatch(ConnectionId(2), "b");
    }

    #[test]
    fn test_handler_may_replace_itself_during_dispatch() {
        let slot = Arc::new(HandlerSlot::new());
        let inner = Arc::clone(&slot);
        slot.set(Arc::new(move |_: ConnectionId, _: &str| {
            inner.set(Arc::new(|_: ConnectionId, _: &str| {}));
        }));

        // Would deadlock if the read lock were held across the call.
        assert!(slot.dispatch(ConnectionId(1), "swap"));
        assert!(slot.is_set());
    }
}
