//! Request handler contract
//!
//! The host supplies one [`Handler`]; the dispatch loop invokes it once per
//! admitted request with exclusive ownership of the request and response.

mod request;
mod response;

pub use request::{IncomingRequest, RequestBody, RequestHead};
pub use response::{HeadReceiver, OutgoingResponse};

use std::future::Future;
use std::pin::Pin;

/// Any failure raised by a handler. Converted to a 500 response.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Per-request callback
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        request: IncomingRequest,
        response: &'a mut OutgoingResponse,
    ) -> HandlerFuture<'a>;
}

/// Handler built from a closure, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure as a [`Handler`]
///
/// ```
/// use tinyserve::handler::handler_fn;
/// use hyper::StatusCode;
///
/// let handler = handler_fn(|_request, response| {
///     Box::pin(async move {
///         response.send_text(StatusCode::OK, "hello")?;
///         Ok(())
///     })
/// });
/// # drop(handler);
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(IncomingRequest, &'a mut OutgoingResponse) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(IncomingRequest, &'a mut OutgoingResponse) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        request: IncomingRequest,
        response: &'a mut OutgoingResponse,
    ) -> HandlerFuture<'a> {
        (self.f)(request, response)
    }
}
