// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listener prefixes, e.g. `http://*:8080/`
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Handler invocations allowed in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Local endpoints (`IP` or `IP:port`) allowed to reach the handler.
    /// Empty means no filtering.
    #[serde(default)]
    pub endpoint_filter: Vec<String>,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_concurrency() -> usize {
    64
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Keep idle HTTP/1.1 connections open between requests
    pub keep_alive: bool,
    /// Seconds a client gets to send the complete request head
    pub header_read_timeout: u64,
    /// Kernel accept queue length
    pub listen_backlog: i32,
    /// Parsed requests buffered while the handler pool is full
    pub queue_depth: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            header_read_timeout: 30,
            listen_backlog: 128,
            queue_depth: 128,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub access_log: bool,
    /// Access log format (common, combined, or custom pattern)
    pub access_log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            access_log: false,
            access_log_format: "common".to_string(),
        }
    }
}
