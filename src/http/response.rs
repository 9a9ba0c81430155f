//! HTTP response building module
//!
//! Fixed responses produced by the connection layer itself, before a request
//! ever reaches the dispatch loop.

use super::body::ResponseBody;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};

/// Build a plain-text response with the given status
pub fn build_text_response(status: StatusCode, text: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, text.len())
        .body(ResponseBody::full(text.to_string()))
        .unwrap_or_else(|e| {
            log_build_error(status, &e);
            Response::new(ResponseBody::empty())
        })
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<ResponseBody> {
    build_text_response(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Log response build error
fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_response() {
        let resp = build_404_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "13");
        assert_eq!(
            resp.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
