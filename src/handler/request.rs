//! Incoming request model

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, UPGRADE};
use hyper::{HeaderMap, Method, Request, Uri, Version};
use std::net::SocketAddr;

/// Request body as handed to handlers
pub type RequestBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// Method, target and headers of a request
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Append a header, keeping any existing values of the same name
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// All values of a header, in the order received
    pub fn header_values(&self, name: &HeaderName) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Whether the client asks to switch to the WebSocket protocol
    pub fn is_upgrade_request(&self) -> bool {
        self.headers
            .get_all(UPGRADE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|protocol| protocol.trim().eq_ignore_ascii_case("websocket"))
    }
}

/// A request accepted by the server, owned by the handler invocation
pub struct IncomingRequest {
    head: RequestHead,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    body: RequestBody,
}

impl IncomingRequest {
    pub fn new(
        head: RequestHead,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        body: RequestBody,
    ) -> Self {
        Self {
            head,
            local_addr,
            remote_addr,
            body,
        }
    }

    /// Request without a body, for hosts driving handlers directly
    pub fn without_body(
        head: RequestHead,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        let body: RequestBody = Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync();
        Self::new(head, local_addr, remote_addr, body)
    }

    pub(crate) fn from_hyper(
        req: Request<Incoming>,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Self {
        let (parts, body) = req.into_parts();
        let head = RequestHead {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
        };
        Self::new(head, local_addr, remote_addr, body.boxed_unsync())
    }

    pub const fn head(&self) -> &RequestHead {
        &self.head
    }

    pub const fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Read the whole body into memory
    pub async fn body_bytes(self) -> Result<Bytes, hyper::Error> {
        Ok(self.body.collect().await?.to_bytes())
    }

    pub fn into_parts(self) -> (RequestHead, RequestBody) {
        (self.head, self.body)
    }
}
