//! Core error taxonomy shared by the transport, protocol and lifecycle layers

use std::fmt;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core framework
///
/// Construction-time failures (socket setup, bootstrap) propagate to the
/// caller of the owning component. Per-call control-plane failures are caught
/// at the container boundary and converted into its latched failure flag.
#[derive(Debug)]
pub enum Error {
    /// Socket create/bind/connect/send/receive failure
    Transport(String),

    /// Malformed or undecodable message
    Protocol(String),

    /// The peer explicitly reported failure; carries the peer-supplied text
    Remote(String),

    /// A child process did not become ready in time
    Bootstrap(String),

    /// Native library or scripting module/class/instantiation failure
    Plugin(String),

    /// Underlying I/O error
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Remote(msg) => write!(f, "remote error: {}", msg),
            Error::Bootstrap(msg) => write!(f, "bootstrap error: {}", msg),
            Error::Plugin(msg) => write!(f, "plugin error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}
