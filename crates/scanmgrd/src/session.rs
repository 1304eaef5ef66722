//! One authenticated client connection: byte pump, state machine and
//! output buffer wired together.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::ManagementBackend;
use crate::omp::dispatch::DispatchContext;
use crate::omp::machine::{Machine, StepOutcome};
use crate::omp::xml::EventPump;
use crate::outbuf::{OutputBuffer, ResponseSink, SendError};
use crate::taskctl::TaskCoordinator;

/// Tracing target for session plumbing.
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// What the host loop should do after feeding a chunk of client bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Input consumed; keep reading.
    Ok,
    /// The client broke the protocol. The error response was queued and
    /// the session ignores further input until [`Session::reset`].
    SyntaxError,
    /// The connection is unusable and must be torn down.
    Fatal,
}

/// Protocol session over one client connection.
///
/// The coordinator is shared across sessions behind a mutex because the
/// scan slot is process-wide; the lock is held only across a single
/// command dispatch.
pub struct Session<S: ResponseSink> {
    backend: Arc<dyn ManagementBackend>,
    coordinator: Arc<Mutex<TaskCoordinator>>,
    sink: S,
    outbuf: OutputBuffer,
    pump: EventPump,
    machine: Machine,
    poisoned: bool,
}

impl<S: ResponseSink> Session<S> {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ManagementBackend>,
        coordinator: Arc<Mutex<TaskCoordinator>>,
        sink: S,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            backend,
            coordinator,
            sink,
            outbuf: OutputBuffer::new(buffer_capacity),
            pump: EventPump::default(),
            machine: Machine::default(),
            poisoned: false,
        }
    }

    /// Whether a protocol error has been hit since the last reset.
    #[must_use]
    pub fn poisoned(&self) -> bool {
        self.poisoned
    }

    /// Feeds freshly read client bytes through the parser and machine,
    /// queueing any responses they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> FeedOutcome {
        if self.poisoned {
            // Everything after a protocol error is discarded until the
            // host resets the session.
            return FeedOutcome::Ok;
        }
        self.pump.push(bytes);
        let events = match self.pump.drain() {
            Ok(events) => events,
            Err(error) => {
                debug!(target: SESSION_TARGET, error = %error, "unparsable client input");
                self.poisoned = true;
                return FeedOutcome::SyntaxError;
            }
        };

        for event in events {
            let outcome = {
                let mut coordinator = match self.coordinator.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let mut ctx = DispatchContext {
                    backend: self.backend.as_ref(),
                    coordinator: &mut coordinator,
                };
                self.machine.handle(event, &mut ctx)
            };
            match outcome {
                StepOutcome::Quiet => {}
                StepOutcome::Respond(response) => {
                    if let FeedOutcome::Fatal = self.queue(&response.render()) {
                        return FeedOutcome::Fatal;
                    }
                }
                StepOutcome::Reject(response) => {
                    let queued = self.queue(&response.render());
                    self.poisoned = true;
                    return match queued {
                        FeedOutcome::Fatal => FeedOutcome::Fatal,
                        _ => FeedOutcome::SyntaxError,
                    };
                }
            }
        }
        FeedOutcome::Ok
    }

    /// Pushes queued response bytes towards the client.
    pub fn flush(&mut self) -> FeedOutcome {
        match self.outbuf.flush(&mut self.sink) {
            Ok(()) | Err(SendError::Stalled) => FeedOutcome::Ok,
            Err(SendError::Fatal(error)) => {
                warn!(target: SESSION_TARGET, error = %error, "client connection failed");
                FeedOutcome::Fatal
            }
        }
    }

    /// Bytes still queued for the client.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.outbuf.queued()
    }

    /// Clears a protocol error: partial input and the half-received
    /// command are dropped, authentication state survives.
    pub fn reset(&mut self) {
        self.pump.reset();
        self.machine.abort_command();
        self.poisoned = false;
    }

    fn queue(&mut self, message: &[u8]) -> FeedOutcome {
        match self.outbuf.send(message, &mut self.sink) {
            Ok(()) => FeedOutcome::Ok,
            Err(SendError::Stalled) => {
                // The whole response was rolled back; the client simply
                // never sees an answer to this command.
                warn!(
                    target: SESSION_TARGET,
                    bytes = message.len(),
                    "client stalled, response dropped"
                );
                FeedOutcome::Ok
            }
            Err(SendError::Fatal(error)) => {
                warn!(target: SESSION_TARGET, error = %error, "client connection failed");
                FeedOutcome::Fatal
            }
        }
    }
}
