//! WebSocket server: accept loop and per-session task management.
//!
//! [`WebSocketServer`] ties the pieces together:
//!
//! 1. Bind a TCP listener on the configured address.
//! 2. Accept connections; give each a fresh [`ConnectionId`], register it,
//!    and spawn a task running [`run_session`].
//! 3. Route [`WebSocketServer::send`] calls to the right session through the
//!    [`SessionRegistry`].
//! 4. On [`WebSocketServer::stop`], leave the accept loop, release the
//!    listener and ask every live session to close with 1001.
//!
//! # Scalability
//!
//! Each session runs in its own Tokio task and the accept loop never waits
//! for one: it registers the connection, spawns, and goes straight back to
//! `accept()`.  Session tasks are not joined.  Each carries a
//! [`RegistrationGuard`] that removes its registry entry however the task
//! ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::application::{
    HandlerSlot, MessageHandler, RegistrationGuard, SessionHandle, SessionRegistry,
};
use crate::domain::{ConnectionId, IdAllocator, ServerConfig, WsError};
use crate::infrastructure::session::{run_session, SessionSettings};

/// Pause after a failed `accept()` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A WebSocket server bound to one port.
///
/// All methods take `&self`; wrap the server in an `Arc` to call
/// [`stop`](Self::stop) or [`send`](Self::send) from other tasks while
/// [`start`](Self::start) is running.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use wsock_server::{ConnectionId, ServerConfig, WebSocketServer};
///
/// # async fn run() -> Result<(), wsock_server::WsError> {
/// let server = Arc::new(WebSocketServer::new(ServerConfig::with_port(8080)));
/// let replies = server.registry().clone();
/// server.on_message(move |id: ConnectionId, text: &str| {
///     replies.send(id, &format!("echo: {text}"));
/// });
/// server.start().await
/// # }
/// ```
#[derive(Debug)]
pub struct WebSocketServer {
    config: ServerConfig,
    registry: SessionRegistry,
    handler: Arc<HandlerSlot>,
    ids: IdAllocator,
    shutdown: watch::Sender<bool>,
}

impl WebSocketServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            registry: SessionRegistry::new(),
            handler: Arc::new(HandlerSlot::new()),
            ids: IdAllocator::new(),
            shutdown,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The registry of live sessions.  Clone it to send from a handler.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Registers the message handler, replacing any previous one.
    pub fn on_message<H>(&self, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.handler.set(Arc::new(handler));
    }

    /// Sends `text` as a TEXT frame to connection `id`.
    ///
    /// Returns `false` if `id` is not a live connection; nothing is sent and
    /// no error is raised.
    pub fn send(&self, id: ConnectionId, text: &str) -> bool {
        self.registry.send(id, text)
    }

    /// Binds the configured address and runs the accept loop until
    /// [`stop`](Self::stop) is called.
    ///
    /// # Errors
    ///
    /// [`WsError::Bind`] if the listener cannot be bound.  Errors on
    /// individual connections never end the loop.
    pub async fn start(&self) -> Result<(), WsError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WsError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener until
    /// [`stop`](Self::stop) is called.  The listener is dropped on return.
    ///
    /// # Errors
    ///
    /// Currently always `Ok`; accept errors are logged and retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), WsError> {
        match listener.local_addr() {
            Ok(addr) => info!("WebSocket server listening on {addr}"),
            Err(e) => warn!("WebSocket server listening (address unavailable: {e})"),
        }

        let mut shutdown = self.shutdown.subscribe();
        loop {
            // Checked before every accept so a stop issued before `serve` was
            // called is not missed.
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = self.accept_connection(stream);
                        info!(%id, %peer, "connection accepted");
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        let signalled = self.registry.close_all();
        info!(sessions = signalled, "accept loop stopped; live sessions asked to close");
        Ok(())
    }

    /// Requests shutdown.  The accept loop exits, the listener is released,
    /// and every live session is sent CLOSE 1001.  Calling it more than once,
    /// or before [`start`](Self::start), is harmless; a stopped server stays
    /// stopped.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Attaches an already connected transport as a new session and returns
    /// its identifier.  Must be called from within a Tokio runtime.
    pub fn accept_connection<S>(&self, stream: S) -> ConnectionId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.ids.next();
        let (handle, commands) = SessionHandle::channel();
        self.registry.register(id, handle);
        let guard = RegistrationGuard::new(id, self.registry.clone());

        let settings = SessionSettings::from(&self.config);
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let _guard = guard;
            match run_session(stream, id, commands, settings, handler).await {
                Ok(()) => info!(%id, "session closed"),
                Err(e) => warn!(%id, "session closed with error: {e}"),
            }
        });

        id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wsock_core::compute_accept_key;
    use wsock_core::handshake::upgrade_response;

    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\
                             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                             \r\n";

    async fn wait_until_empty(registry: &SessionRegistry) {
        for _ in 0..200 {
            if registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry still holds {:?}", registry.ids());
    }

    #[test]
    fn test_new_server_is_idle() {
        let server = WebSocketServer::new(ServerConfig::with_port(0));
        assert!(server.registry().is_empty());
        assert!(!server.is_stopped());
        assert_eq!(server.config().port, 0);
    }

    #[test]
    fn test_send_to_unknown_connection_is_a_no_op() {
        let server = WebSocketServer::new(ServerConfig::default());
        assert!(!server.send(ConnectionId(1), "nobody"));
    }

    #[tokio::test]
    async fn test_accept_connection_registers_then_unregisters() {
        // Arrange
        let server = WebSocketServer::new(ServerConfig::default());
        let (mut client, transport) = tokio::io::duplex(4096);

        // Act
        let id = server.accept_connection(transport);

        // Assert: registered as soon as it is accepted
        assert!(server.registry().contains(id));

        // Act: peer goes away mid-handshake
        client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        drop(client);

        // Assert: teardown removed it and sends are now no-ops
        wait_until_empty(server.registry()).await;
        assert!(!server.send(id, "late"));
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let server = WebSocketServer::new(ServerConfig::default());
        let (_a, first) = tokio::io::duplex(64);
        let (_b, second) = tokio::io::duplex(64);

        let a = server.accept_connection(first);
        let b = server.accept_connection(second);

        assert_ne!(a, b);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_send_reaches_open_session() {
        let server = WebSocketServer::new(ServerConfig::default());
        let (mut client, transport) = tokio::io::duplex(4096);
        let id = server.accept_connection(transport);

        client.write_all(REQUEST).await.unwrap();
        let expected = upgrade_response(&compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="));
        let mut head = vec![0u8; expected.len()];
        client.read_exact(&mut head).await.unwrap();
        assert_eq!(head, expected);

        assert!(server.send(id, "pushed"));
        let mut frame = [0u8; 8];
        client.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, *b"\x81\x06pushed");
    }

    #[tokio::test]
    async fn test_stop_before_serve_returns_immediately() {
        let server = WebSocketServer::new(ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        server.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), server.serve(listener)).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(server.is_stopped());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        // Arrange: occupy a port
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = ServerConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            ..ServerConfig::with_port(port)
        };
        let server = WebSocketServer::new(config);

        // Act
        let result = server.start().await;

        // Assert
        assert!(matches!(result, Err(WsError::Bind { addr, .. }) if addr.port() == port));
    }
}
