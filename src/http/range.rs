//! HTTP Range request parsing module
//!
//! Resolves a single `bytes=<start>-<end>` header into an inclusive window
//! over a resource of known length. Pure, no I/O.

use crate::error::RangeError;
use hyper::header::{HeaderMap, RANGE};

/// Inclusive byte window `[start, end]` into a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// Number of bytes covered by the window, saturating at `u64::MAX`
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Extract the single `Range` header value from a request.
///
/// More than one `Range` header has no defined meaning and is rejected.
pub fn range_header(headers: &HeaderMap) -> Result<Option<&str>, RangeError> {
    let mut values = headers.get_all(RANGE).iter();
    let Some(first) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(RangeError::Unsupported);
    }
    first
        .to_str()
        .map(Some)
        .map_err(|_| RangeError::Malformed("non-ASCII header value".to_string()))
}

/// Resolve a `Range` header against a resource length.
///
/// - absent header: the whole resource, or `None` when `length` is 0
/// - `bytes=a-b`: `[a, min(b, length-1)]`
/// - `bytes=a-`: `[a, length-1]`
/// - `bytes=-b`: `[0, min(b, length-1)]` (omitted start means 0, not a suffix)
///
/// # Examples
/// ```
/// use tinyserve::http::range::{resolve, RangeSpec};
///
/// assert_eq!(resolve(Some("bytes=0-99"), 1000), Ok(Some(RangeSpec { start: 0, end: 99 })));
/// assert_eq!(resolve(None, 1000), Ok(Some(RangeSpec { start: 0, end: 999 })));
/// assert_eq!(resolve(None, 0), Ok(None));
/// ```
pub fn resolve(
    range_header: Option<&str>,
    length: u64,
) -> Result<Option<RangeSpec>, RangeError> {
    let Some(header) = range_header else {
        return Ok(length.checked_sub(1).map(|end| RangeSpec { start: 0, end }));
    };

    let malformed = || RangeError::Malformed(header.to_string());

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?;

    // Only a single range is supported
    if spec.contains(',') {
        return Err(malformed());
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    if start_str.is_empty() && end_str.is_empty() {
        return Err(malformed());
    }

    let Some(last) = length.checked_sub(1) else {
        // Nothing in an empty resource can be addressed
        return Err(malformed());
    };

    let start = parse_position(start_str).ok_or_else(malformed)?.unwrap_or(0);
    let end = parse_position(end_str)
        .ok_or_else(malformed)?
        .map_or(last, |e| e.min(last));

    if start > end {
        return Err(malformed());
    }

    Ok(Some(RangeSpec { start, end }))
}

/// Parse one side of the range. `Some(None)` for an omitted bound,
/// `None` for an invalid token.
fn parse_position(token: &str) -> Option<Option<u64>> {
    if token.is_empty() {
        return Some(None);
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u64>().ok().map(Some)
}
