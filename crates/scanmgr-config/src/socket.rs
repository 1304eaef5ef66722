//! Declarative configuration for daemon listener sockets.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Listener endpoint the daemon binds to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Ensures the socket's parent directory exists with restrictive
    /// permissions.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(parent.as_std_path())
            .map_err(|source| SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(f, "unix:{path}"),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(path) = value.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(SocketParseError::EmptyPath);
            }
            return Ok(Self::unix(path));
        }
        if let Some(address) = value.strip_prefix("tcp:") {
            let (host, port) = address
                .rsplit_once(':')
                .ok_or_else(|| SocketParseError::MissingPort {
                    address: address.to_string(),
                })?;
            if host.is_empty() {
                return Err(SocketParseError::EmptyHost);
            }
            let port = port.parse().map_err(|_| SocketParseError::InvalidPort {
                port: port.to_string(),
            })?;
            return Ok(Self::tcp(host, port));
        }
        Err(SocketParseError::UnknownTransport {
            endpoint: value.to_string(),
        })
    }
}

/// Errors raised while parsing a socket endpoint from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SocketParseError {
    /// The endpoint did not start with a known transport prefix.
    #[error("endpoint '{endpoint}' must start with 'unix:' or 'tcp:'")]
    UnknownTransport { endpoint: String },
    /// A Unix endpoint supplied no path.
    #[error("unix endpoint requires a socket path")]
    EmptyPath,
    /// A TCP endpoint supplied no host.
    #[error("tcp endpoint requires a host")]
    EmptyHost,
    /// A TCP endpoint supplied no port.
    #[error("tcp endpoint '{address}' requires a port")]
    MissingPort { address: String },
    /// The TCP port was not a number in range.
    #[error("invalid tcp port '{port}'")]
    InvalidPort { port: String },
}

/// Errors raised while preparing the socket filesystem.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Creating the parent directory failed.
    #[error("failed to prepare socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
