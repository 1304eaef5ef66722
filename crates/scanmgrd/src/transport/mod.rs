//! Socket listener for the manager's client endpoints.
//!
//! The transport binds the configured endpoint, accepts connections in a
//! background thread, and hands each one to a handler that runs a
//! protocol session until the client disconnects.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream, OmpConnectionHandler};
pub use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
