//! The OMP command processor: XML event pump, command grammar tables,
//! staging store, element state machine, dispatcher and response
//! rendering.

pub(crate) mod dispatch;
pub(crate) mod errors;
pub(crate) mod grammar;
pub(crate) mod machine;
pub(crate) mod respond;
pub(crate) mod staging;
pub(crate) mod xml;

pub use errors::OmpError;
pub use machine::{ClientState, Machine};
pub use respond::Response;

/// Tracing target for protocol processing.
pub(crate) const OMP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::omp");
