//! Configuration shared by the scan manager daemon binaries.
//!
//! Values are resolved from CLI flags first and environment variables
//! second, falling back to the defaults in [`defaults`]. The daemon keeps
//! its configuration surface deliberately small: where to listen, how to
//! log, and how large each session's output buffer is.

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_SESSION_BUFFER, DEFAULT_TCP_PORT, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

use clap::Parser;

/// Resolved daemon configuration.
#[derive(Debug, Clone, Parser, PartialEq, Eq)]
#[command(name = "scanmgrd", about = "Vulnerability-scan manager daemon")]
pub struct Config {
    /// Log filter expression in tracing env-filter syntax.
    #[arg(long = "log-filter", env = "SCANMGR_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format.
    #[arg(long = "log-format", env = "SCANMGR_LOG_FORMAT", default_value_t = LogFormat::default())]
    pub log_format: LogFormat,

    /// Listener endpoint, e.g. `unix:/run/scanmgr/scanmgrd.sock` or
    /// `tcp:127.0.0.1:9390`.
    #[arg(long = "socket", env = "SCANMGR_SOCKET", default_value_t = default_socket_endpoint())]
    pub socket: SocketEndpoint,

    /// Per-session output buffer capacity in bytes.
    #[arg(long = "session-buffer", env = "SCANMGR_SESSION_BUFFER", default_value_t = DEFAULT_SESSION_BUFFER)]
    pub session_buffer: usize,
}

impl Config {
    /// Loads the configuration from process arguments and environment.
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::default(),
            socket: default_socket_endpoint(),
            session_buffer: DEFAULT_SESSION_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_the_default_impl() {
        let parsed = Config::try_parse_from(["scanmgrd"]).expect("bare invocation parses");
        assert_eq!(parsed, Config::default());
    }

    #[rstest]
    #[case("tcp:127.0.0.1:9390", SocketEndpoint::tcp("127.0.0.1", 9390))]
    #[case("unix:/tmp/scanmgrd.sock", SocketEndpoint::unix("/tmp/scanmgrd.sock"))]
    fn socket_flag_overrides_default(#[case] flag: &str, #[case] expected: SocketEndpoint) {
        let parsed = Config::try_parse_from(["scanmgrd", "--socket", flag])
            .expect("socket flag parses");
        assert_eq!(parsed.socket, expected);
    }

    #[test]
    fn log_format_flag_is_case_insensitive() {
        let parsed = Config::try_parse_from(["scanmgrd", "--log-format", "COMPACT"])
            .expect("log format parses");
        assert_eq!(parsed.log_format, LogFormat::Compact);
    }

    #[test]
    fn rejects_malformed_socket() {
        assert!(Config::try_parse_from(["scanmgrd", "--socket", "carrier-pigeon:coop"]).is_err());
    }
}
