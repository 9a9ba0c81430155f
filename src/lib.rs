//! tinyserve
//!
//! A small embeddable HTTP/1.1 server. The host supplies listener prefixes
//! and one request handler; the server bounds how many handler invocations
//! run at once and provides a range-aware, cache-validating responder for
//! streaming files and buffers.
//!
//! - [`server`]: prefixes, listeners, admission control, dispatch loop
//! - [`handler`]: the handler contract and request/response types
//! - [`http`]: range resolution, conditional requests, streaming responder
//! - [`config`]: typed configuration and loading
//! - [`logger`]: `tracing` setup and log helpers

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;

pub use config::ServerConfig;
pub use error::{
    AdmissionError, Error, RangeError, ResponseError, ServeError, ServerError, StartupError,
};
pub use handler::{handler_fn, Handler, HandlerError, IncomingRequest, OutgoingResponse};
pub use server::{run, Server, Shutdown};
