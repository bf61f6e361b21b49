//! Application layer for wsock-server.
//!
//! Connects sessions to the application: the [`SessionRegistry`] lets any task
//! address a live connection by id, and the [`HandlerSlot`] delivers incoming
//! messages to the registered [`MessageHandler`].  Neither type touches a
//! socket directly.

pub mod handler;
pub mod registry;

pub use handler::{HandlerSlot, MessageHandler};
pub use registry::{Outbound, OutboundReceiver, RegistrationGuard, SessionHandle, SessionRegistry};
