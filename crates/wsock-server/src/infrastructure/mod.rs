//! Infrastructure layer for wsock-server.
//!
//! Everything that performs I/O lives here:
//!
//! - Binding the TCP listener and running the accept loop
//! - Performing the HTTP upgrade on each connection
//! - Reading, answering and writing frames for each session
//! - Spawning one Tokio task per connection
//! - Handling the shutdown request
//!
//! Frame encoding and the handshake computation come from `wsock-core`;
//! message routing comes from the application layer.

pub mod server;
pub mod session;

pub use server::WebSocketServer;
pub use session::{run_session, SessionSettings};
