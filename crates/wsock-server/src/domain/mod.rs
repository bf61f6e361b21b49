//! Domain layer for wsock-server.
//!
//! Plain types shared by every other layer.  Nothing in here opens a socket,
//! spawns a task or reads the environment; the binary and the infrastructure
//! layer decide where values come from.

pub mod config;
pub mod connection;
pub mod error;

pub use config::{ConfigError, ServerConfig};
pub use connection::{ConnectionId, IdAllocator, SessionState};
pub use error::WsError;
