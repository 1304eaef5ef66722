//! Connection handling: one protocol session per accepted stream.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::ManagementBackend;
use crate::outbuf::{ResponseSink, SinkError};
use crate::session::{FeedOutcome, Session};
use crate::taskctl::TaskCoordinator;

use super::LISTENER_TARGET;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// How long a read blocks before the handler polls for scan completions.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 4096;

/// Stream types accepted by the listener.
pub enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl ResponseSink for ConnectionStream {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SinkError> {
        let result = match self {
            Self::Tcp(stream) => stream.write(bytes),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(bytes),
        };
        match result {
            Ok(written) => Ok(written),
            // A full send queue is a stall, not a failure.
            Err(error)
                if error.kind() == io::ErrorKind::WouldBlock
                    || error.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(error) => Err(SinkError::new(error.to_string())),
        }
    }
}

/// Handles accepted socket connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Production handler: runs a protocol session over the stream and polls
/// the coordinator for scan completions while the client is quiet.
pub struct OmpConnectionHandler {
    backend: Arc<dyn ManagementBackend>,
    coordinator: Arc<Mutex<TaskCoordinator>>,
    session_buffer: usize,
}

impl OmpConnectionHandler {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ManagementBackend>,
        coordinator: Arc<Mutex<TaskCoordinator>>,
        session_buffer: usize,
    ) -> Self {
        Self {
            backend,
            coordinator,
            session_buffer,
        }
    }

    fn poll_scans(&self) {
        let mut coordinator = match self.coordinator.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(error) = coordinator.poll_completion(self.backend.as_ref()) {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to record scan completion"
            );
        }
    }
}

impl ConnectionHandler for OmpConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let sink = match stream.try_clone() {
            Ok(sink) => sink,
            Err(error) => {
                warn!(target: LISTENER_TARGET, error = %error, "failed to clone stream");
                return;
            }
        };
        if let Err(error) = stream.set_read_timeout(Some(POLL_INTERVAL)) {
            warn!(target: LISTENER_TARGET, error = %error, "failed to set read timeout");
            return;
        }

        let mut session = Session::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.coordinator),
            sink,
            self.session_buffer,
        );
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            self.poll_scans();
            match stream.read(&mut chunk) {
                Ok(0) => {
                    // Orderly disconnect; push out whatever is queued.
                    let _ = session.flush();
                    debug!(target: LISTENER_TARGET, "client disconnected");
                    return;
                }
                Ok(read) => {
                    let fed = chunk.get(..read).map_or(FeedOutcome::Ok, |bytes| {
                        session.feed(bytes)
                    });
                    match fed {
                        FeedOutcome::Ok => {}
                        FeedOutcome::SyntaxError => {
                            // The error response is queued; drop the broken
                            // input and let the client start over.
                            if session.flush() == FeedOutcome::Fatal {
                                return;
                            }
                            session.reset();
                        }
                        FeedOutcome::Fatal => return,
                    }
                    if session.flush() == FeedOutcome::Fatal {
                        return;
                    }
                }
                Err(error)
                    if error.kind() == io::ErrorKind::WouldBlock
                        || error.kind() == io::ErrorKind::TimedOut =>
                {
                    if session.flush() == FeedOutcome::Fatal {
                        return;
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(target: LISTENER_TARGET, error = %error, "client read failed");
                    return;
                }
            }
        }
    }
}
