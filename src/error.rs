//! Error taxonomy
//!
//! Startup failures propagate to the host before serving begins; per-request
//! failures are turned into responses and never end the dispatch loop.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failure to bring the server up. Never retried by the server itself.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no listener prefixes configured")]
    NoPrefixes,

    #[error("invalid listener prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("invalid endpoint filter entry '{0}'")]
    InvalidEndpoint(String),

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    /// The OS refused the bind for lack of a reservation or capability.
    /// `command` is what an administrator has to run before retrying.
    #[error("permission denied binding {prefix}; run `{command}` and retry")]
    Permission { prefix: String, command: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Client-supplied `Range` header problems, answered with 400.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed Range header: {0}")]
    Malformed(String),

    #[error("multiple Range headers are not supported")]
    Unsupported,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("permit acquisition cancelled")]
    Cancelled,
}

/// Transport-level response failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    #[error("response already closed")]
    Closed,

    #[error("response headers already sent")]
    HeadersSent,

    #[error("client closed the connection")]
    ClientGone,

    /// The response was dropped before its head reached the connection.
    #[error("response abandoned before headers were sent")]
    Abandoned,
}

/// Failures surfaced by the stream responder after it has written
/// whatever response the condition calls for.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fatal conditions that end a running dispatch loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("all listeners stopped accepting")]
    ListenersClosed,
}

/// Anything `server::run` can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Server(#[from] ServerError),
}
