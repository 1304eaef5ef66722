//! Protocol engine of the vulnerability-scan manager daemon.
//!
//! The daemon speaks an XML management protocol over a unix or TCP
//! socket. Client bytes arrive in arbitrary chunks and flow through an
//! incremental event pump into a per-session state machine; completed
//! commands are dispatched against a [`backend::ManagementBackend`] and
//! answered through a bounded output buffer that never reorders or drops
//! response bytes. Scan execution is delegated to worker handles owned by
//! a process-wide [`taskctl::TaskCoordinator`], which enforces the
//! one-active-scan-per-process invariant.

pub mod backend;
pub mod omp;
pub mod outbuf;
pub mod placeholder;
pub mod session;
pub mod taskctl;
pub mod telemetry;
pub mod transport;

pub use backend::{BackendError, ManagementBackend, ResourceHandle};
pub use omp::{ClientState, Machine, OmpError, Response};
pub use outbuf::{OutputBuffer, ResponseSink, SendError, SinkError};
pub use placeholder::{PlaceholderBackend, PlaceholderRunner};
pub use session::{FeedOutcome, Session};
pub use taskctl::{
    DeleteOutcome, RunOutcome, ScanCompletion, ScanControl, ScanHandle, ScanResult, ScanRunner,
    ScanSignal, ScanWorkerError, TaskCoordinator,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle, OmpConnectionHandler,
    SocketListener,
};
