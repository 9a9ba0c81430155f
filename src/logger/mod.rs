//! Logger module
//!
//! Provides logging utilities for the server including:
//! - Subscriber setup from `LoggingConfig`
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error and warning logging
//!
//! All events go through `tracing`; the host may install its own subscriber
//! instead of calling [`init`].

mod format;

pub use format::AccessLogEntry;

use crate::config::LoggingConfig;
use crate::server::ListenerPrefix;
use hyper::{Method, StatusCode};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
}

pub fn log_server_start(addrs: &[SocketAddr], max_concurrency: usize) {
    for addr in addrs {
        tracing::info!(address = %addr, "Listening on http://{addr}");
    }
    tracing::info!(max_concurrency, "Server started");
}

pub fn log_listener_bound(addr: &SocketAddr, prefixes: &[ListenerPrefix]) {
    for prefix in prefixes {
        tracing::debug!(address = %addr, %prefix, "Listener bound");
    }
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::warn!("Failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    tracing::error!("{message}");
}

pub fn log_warning(message: &str) {
    tracing::warn!("{message}");
}

pub fn log_request_rejected(method: &Method, path: &str, status: StatusCode, reason: &str) {
    tracing::info!(%method, path, status = status.as_u16(), "Request rejected: {reason}");
}

pub fn log_handler_failed(method: &Method, path: &str, message: &str, headers_sent: bool) {
    if headers_sent {
        tracing::error!(%method, path, "Handler failed after headers were sent: {message}");
    } else {
        tracing::error!(%method, path, "Handler failed: {message}");
    }
}

pub fn log_client_aborted(bytes_sent: u64) {
    tracing::debug!(bytes_sent, "Client closed the connection mid-transfer");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}

pub fn log_shutdown() {
    tracing::info!("Shutdown requested, no longer dispatching requests");
}
