//! wsock-server library crate.
//!
//! A WebSocket server engine built on `tokio` and the protocol primitives in
//! `wsock-core`.  It upgrades raw byte streams, runs one task per connection,
//! and lets the application address messages to a connection by identifier.
//!
//! # Architecture
//!
//! ```text
//! TCP client (WebSocket frames)
//!         ↕
//! [wsock-server]
//!   ├── domain/           ServerConfig, ConnectionId, SessionState, WsError
//!   ├── application/      SessionRegistry, MessageHandler, HandlerSlot
//!   └── infrastructure/
//!         ├── session/    Per-connection state machine (handshake + frames)
//!         └── server/     WebSocketServer: accept loop, send, stop
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async code.
//! - `application` depends on `domain` and `wsock-core`; the only runtime type
//!   it touches is the mpsc channel used to reach a session.
//! - `infrastructure` owns every socket and spawned task.

/// Domain layer: configuration, identifiers and error types (no I/O).
pub mod domain;

/// Application layer: session registry and message dispatch.
pub mod application;

/// Infrastructure layer: connection sessions and the accept loop.
pub mod infrastructure;

pub use application::{MessageHandler, SessionRegistry};
pub use domain::{ConnectionId, ServerConfig, WsError};
pub use infrastructure::WebSocketServer;
