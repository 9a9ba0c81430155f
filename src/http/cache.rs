//! HTTP cache control module
//!
//! Provides `ETag`/`Last-Modified` generation and conditional request handling.

use chrono::{DateTime, Utc};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use std::time::SystemTime;

/// RFC 1123 date layout used by `Last-Modified`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Validator pair computed from a resource's modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    /// Quoted `ETag`, e.g. `"65a1f2c0"`
    pub etag: String,
    /// Modification time truncated to whole seconds
    pub last_modified: DateTime<Utc>,
}

impl Validator {
    /// Build the validator for a modification timestamp.
    ///
    /// HTTP dates carry whole seconds only, so the timestamp is truncated
    /// first; the `ETag` is the hex of those seconds.
    pub fn from_modified(modified: SystemTime) -> Self {
        let modified: DateTime<Utc> = modified.into();
        let seconds = modified.timestamp();
        let last_modified = DateTime::from_timestamp(seconds, 0).unwrap_or(modified);
        Self {
            etag: format!("\"{seconds:x}\""),
            last_modified,
        }
    }

    /// `Last-Modified` header value
    pub fn last_modified_header(&self) -> String {
        self.last_modified.format(HTTP_DATE_FORMAT).to_string()
    }

    /// Set `ETag` and `Last-Modified` on a response header map
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(v) = HeaderValue::from_str(&self.etag) {
            headers.insert(ETAG, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.last_modified_header()) {
            headers.insert(LAST_MODIFIED, v);
        }
    }
}

/// Conditional headers supplied by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestValidators {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl RequestValidators {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        Self {
            if_none_match: text(IF_NONE_MATCH),
            if_modified_since: text(IF_MODIFIED_SINCE),
        }
    }
}

/// Decide whether the client's cached copy is still current.
///
/// `If-None-Match` wins when present; otherwise a parseable
/// `If-Modified-Since` at or after the modification time counts as fresh.
pub fn is_not_modified(request: &RequestValidators, resource: &Validator) -> bool {
    if let Some(if_none_match) = request.if_none_match.as_deref() {
        return check_etag_match(Some(if_none_match), &resource.etag);
    }

    request
        .if_modified_since
        .as_deref()
        .and_then(parse_http_date)
        .is_some_and(|since| resource.last_modified <= since)
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports:
/// - Single `ETag`: `"abc123"`
/// - Multiple `ETags`: `"abc123", "def456"`
/// - Weak tags: `W/"abc123"`
/// - Wildcard: `*`
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    let etag = opaque_tag(etag);
    if_none_match.is_some_and(|client_etag| {
        client_etag
            .split(',')
            .map(str::trim)
            .any(|e| e == "*" || opaque_tag(e) == etag)
    })
}

/// Strip the weak prefix and surrounding quotes from an entity tag
fn opaque_tag(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.trim_matches('"')
}

/// Parse an RFC 1123 date such as `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
