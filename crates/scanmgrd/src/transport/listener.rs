//! Accept loop for client sessions.
//!
//! The listener blocks in `accept` on a dedicated thread and hands each
//! connection to the session handler on a thread of its own. Shutdown
//! works by raising a flag and then connecting to the listener once, so
//! the blocked `accept` call returns and observes the flag; no polling
//! interval is involved.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use scanmgr_config::SocketEndpoint;

use super::{ConnectionHandler, LISTENER_TARGET, ListenerError, handler::ConnectionStream};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::{Path, PathBuf};

/// Pause after an accept failure so a broken socket cannot spin the loop.
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
/// Bound on the self-connect that unblocks a shutting-down listener.
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Listener bound to the configured client endpoint.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
    waker: SessionWaker,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl ListenerKind {
    /// Blocks until a client connects.
    fn accept(&self) -> io::Result<ConnectionStream> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(ConnectionStream::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(ConnectionStream::Unix(stream))
            }
        }
    }
}

impl SocketListener {
    /// Binds the endpoint, reclaiming a stale unix socket file first.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        endpoint.prepare_filesystem()?;
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(host, *port)?;
                let addr = listener
                    .local_addr()
                    .map_err(|source| ListenerError::LocalAddr { source })?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    listener: ListenerKind::Tcp(listener),
                    waker: SessionWaker::Tcp(addr),
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    let std_path = path.as_std_path();
                    reclaim_stale_socket(std_path)?;
                    let listener =
                        UnixListener::bind(std_path).map_err(|source| ListenerError::BindUnix {
                            path: path.to_string(),
                            source,
                        })?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        listener: ListenerKind::Unix(listener),
                        waker: SessionWaker::Unix(std_path.to_path_buf()),
                    })
                }

                #[cfg(not(unix))]
                {
                    Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
        }
    }

    /// Address actually bound, for TCP endpoints with an ephemeral port.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Moves the listener onto its accept thread.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let waker = self.waker.clone();
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("scanmgrd-accept".to_owned())
            .spawn(move || self.serve(&flag, &handler))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            shutdown,
            waker,
            thread: Some(thread),
        })
    }

    fn serve(self, shutdown: &AtomicBool, handler: &Arc<dyn ConnectionHandler>) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.endpoint,
            "client listener active"
        );
        let mut session_seq = 0u64;
        let mut last_error = None::<io::ErrorKind>;
        loop {
            let stream = match self.listener.accept() {
                Ok(stream) => stream,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if last_error != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, error = %error, "accept failed");
                    }
                    last_error = Some(error.kind());
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            last_error = None;
            session_seq += 1;
            debug!(target: LISTENER_TARGET, session = session_seq, "client connected");
            let handler = Arc::clone(handler);
            let spawned = thread::Builder::new()
                .name(format!("scanmgrd-session-{session_seq}"))
                .spawn(move || handler.handle(stream));
            if let Err(error) = spawned {
                warn!(
                    target: LISTENER_TARGET,
                    error = %error,
                    session = session_seq,
                    "failed to spawn session thread"
                );
            }
        }

        #[cfg(unix)]
        remove_socket_file(&self.endpoint);
        info!(target: LISTENER_TARGET, "client listener stopped");
    }
}

/// Unblocks the accept thread by connecting to its own endpoint once.
#[derive(Debug, Clone)]
enum SessionWaker {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl SessionWaker {
    fn wake(&self) {
        let poked = match self {
            Self::Tcp(addr) => TcpStream::connect_timeout(addr, WAKE_TIMEOUT).map(drop),
            #[cfg(unix)]
            Self::Unix(path) => UnixStream::connect(path).map(drop),
        };
        if let Err(error) = poked {
            // The accept thread may already be past its accept call.
            debug!(target: LISTENER_TARGET, error = %error, "listener wake connect failed");
        }
    }
}

/// Handle to the accept thread.
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    waker: SessionWaker,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the accept thread to stop and unblocks it.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.waker.wake();
    }

    /// Waits for the accept thread to exit.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_string(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Removes a leftover socket file from a crashed daemon, refusing to
/// touch anything that is not a dead socket.
#[cfg(unix)]
fn reclaim_stale_socket(path: &Path) -> Result<(), ListenerError> {
    if !path.exists() {
        return Ok(());
    }
    let display_path = path.display().to_string();
    let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixInspect {
        path: display_path.clone(),
        source,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display_path });
    }
    match UnixStream::connect(path) {
        // A connectable socket means another daemon instance is live.
        Ok(_stream) => Err(ListenerError::UnixInUse { path: display_path }),
        Err(error)
            if error.kind() == io::ErrorKind::ConnectionRefused
                || error.kind() == io::ErrorKind::NotFound =>
        {
            info!(target: LISTENER_TARGET, path = %display_path, "removing stale socket file");
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display_path,
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixInspect {
            path: display_path,
            source,
        }),
    }
}

#[cfg(unix)]
fn remove_socket_file(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ConnectionHandler for CountingHandler {
        fn handle(&self, _stream: ConnectionStream) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Arc<CountingHandler>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler {
            count: Arc::clone(&count),
        });
        (handler, count)
    }

    fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn tcp_listener_accepts_connections() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        let listener = SocketListener::bind(&endpoint).expect("bind tcp listener");
        let addr = listener.local_addr().expect("tcp listener reports its address");
        let (handler, count) = counting();
        let handle = listener.start(handler).expect("start listener");

        TcpStream::connect(addr).expect("connect first client");
        TcpStream::connect(addr).expect("connect second client");

        assert!(wait_for_count(&count, 2), "expected two connections");
        handle.shutdown();
        handle.join().expect("join listener");
    }

    #[test]
    fn shutdown_unblocks_an_idle_listener() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        let listener = SocketListener::bind(&endpoint).expect("bind tcp listener");
        let (handler, _count) = counting();
        let handle = listener.start(handler).expect("start listener");

        // Nobody ever connects; shutdown alone must end the accept loop.
        let started = Instant::now();
        handle.shutdown();
        handle.join().expect("join listener");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_cleans_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("scanmgrd.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let listener = SocketListener::bind(&endpoint).expect("bind new listener");
        let (handler, count) = counting();
        let handle = listener.start(handler).expect("start listener");

        UnixStream::connect(&path).expect("connect unix client");
        assert!(wait_for_count(&count, 1), "expected one connection");

        handle.shutdown();
        handle.join().expect("join listener");
        assert!(
            !path.exists(),
            "listener should remove unix socket on shutdown"
        );
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("scanmgrd.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
    }
}
