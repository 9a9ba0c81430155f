//! Access log format module
//!
//! Supports:
//! - `common` (Common Log Format - CLF)
//! - `combined` (Apache/Nginx combined format)
//! - Custom patterns with `$variable` substitution

use crate::handler::RequestHead;
use chrono::Local;
use hyper::header::{HeaderName, REFERER, USER_AGENT};
use std::net::SocketAddr;
use std::time::Duration;

/// One completed request as it appears in the access log
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub remote_addr: SocketAddr,
    pub time: chrono::DateTime<Local>,
    pub method: String,
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    pub http_version: &'static str,
    pub status: u16,
    /// Body bytes handed to the connection
    pub body_bytes: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub request_time: Duration,
}

impl AccessLogEntry {
    /// Capture the request side; the response side is filled in by `finish`
    pub fn from_request(head: &RequestHead, remote_addr: SocketAddr) -> Self {
        let header = |name: HeaderName| {
            head.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            remote_addr,
            time: Local::now(),
            method: head.method.to_string(),
            path: head.path().to_string(),
            query: head.uri.query().map(str::to_string),
            http_version: version_label(head.version),
            status: 200,
            body_bytes: 0,
            referer: header(REFERER),
            user_agent: header(USER_AGENT),
            request_time: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn finish(mut self, status: u16, body_bytes: u64, request_time: Duration) -> Self {
        self.status = status;
        self.body_bytes = body_bytes;
        self.request_time = request_time;
        self
    }

    /// Format the log entry according to the specified format
    pub fn format(&self, format: &str) -> String {
        match format {
            "common" => self.format_common(),
            "combined" => self.format_combined(),
            custom => self.format_custom(custom),
        }
    }

    fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    fn time_local(&self) -> String {
        self.time.format("%d/%b/%Y:%H:%M:%S %z").to_string()
    }

    /// `$remote_addr - - [$time_local] "$request" $status $body_bytes_sent`
    fn format_common(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
            self.remote_addr.ip(),
            self.time_local(),
            self.method,
            self.request_uri(),
            self.http_version,
            self.status,
            self.body_bytes,
        )
    }

    /// Common format plus `"$http_referer" "$http_user_agent"`
    fn format_combined(&self) -> String {
        format!(
            "{} \"{}\" \"{}\"",
            self.format_common(),
            self.referer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }

    /// Custom format with variable substitution
    ///
    /// Supported variables: `$remote_addr`, `$time_local`, `$time_iso8601`,
    /// `$request`, `$request_method`, `$request_uri`, `$status`,
    /// `$body_bytes_sent`, `$http_referer`, `$http_user_agent`,
    /// `$request_time` (seconds, 3 decimal places).
    fn format_custom(&self, pattern: &str) -> String {
        let request_uri = self.request_uri();
        let request_line = format!("{} {request_uri} HTTP/{}", self.method, self.http_version);

        // $request_time and $request_method/_uri before $request
        pattern
            .replace("$remote_addr", &self.remote_addr.ip().to_string())
            .replace("$time_local", &self.time_local())
            .replace("$time_iso8601", &self.time.to_rfc3339())
            .replace("$request_time", &format!("{:.3}", self.request_time.as_secs_f64()))
            .replace("$request_method", &self.method)
            .replace("$request_uri", &request_uri)
            .replace("$request", &request_line)
            .replace("$status", &self.status.to_string())
            .replace("$body_bytes_sent", &self.body_bytes.to_string())
            .replace("$http_referer", self.referer.as_deref().unwrap_or("-"))
            .replace("$http_user_agent", self.user_agent.as_deref().unwrap_or("-"))
    }
}

const fn version_label(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_09 => "0.9",
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        hyper::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
