// Dispatch loop module
// Takes accepted exchanges off the request queue, applies the admission
// rules and runs the handler for each one in its own task

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use hyper::StatusCode;
use tokio::sync::mpsc;

use super::admission::{AdmissionController, Permit};
use super::connection::{Accepted, Exchange};
use super::prefix::EndpointFilter;
use super::signal::Shutdown;
use crate::error::ServerError;
use crate::handler::{Handler, IncomingRequest, OutgoingResponse};
use crate::logger::{self, AccessLogEntry};

/// Everything the dispatch loop needs besides the queue
pub struct DispatchContext {
    pub handler: Arc<dyn Handler>,
    pub admission: AdmissionController,
    pub endpoint_filter: Option<EndpointFilter>,
    /// Access log format, `None` when access logging is off
    pub access_log: Option<Arc<str>>,
}

/// Run until shutdown or a fatal accept error.
///
/// Returns `Ok(())` on shutdown without waiting for running handlers.
pub async fn run_dispatch_loop(
    mut queue: mpsc::Receiver<Accepted>,
    ctx: DispatchContext,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    loop {
        let accepted = tokio::select! {
            biased;

            () = shutdown.triggered() => break,
            next = queue.recv() => next,
        };

        let Exchange {
            request,
            mut response,
        } = match accepted {
            Some(Ok(exchange)) => exchange,
            Some(Err(e)) => return Err(ServerError::Accept(e)),
            None => return Err(ServerError::ListenersClosed),
        };

        if request.head().is_upgrade_request() {
            reject(
                &request,
                &mut response,
                StatusCode::BAD_REQUEST,
                "protocol upgrades are not supported",
            );
            continue;
        }

        if let Some(filter) = &ctx.endpoint_filter {
            if !filter.allows(request.local_addr()) {
                reject(
                    &request,
                    &mut response,
                    StatusCode::NOT_FOUND,
                    "local endpoint not allowed",
                );
                continue;
            }
        }

        // Backpressure: nothing else is dispatched while the pool is empty
        let Ok(permit) = ctx.admission.acquire(&shutdown).await else {
            break;
        };

        tokio::spawn(invoke_handler(
            Arc::clone(&ctx.handler),
            request,
            response,
            permit,
            ctx.access_log.clone(),
        ));
    }

    logger::log_shutdown();
    Ok(())
}

/// Answer without running the handler and close the connection
fn reject(
    request: &IncomingRequest,
    response: &mut OutgoingResponse,
    status: StatusCode,
    reason: &str,
) {
    logger::log_request_rejected(request.method(), request.path(), status, reason);
    response.set_keep_alive(false);
    let text = status.canonical_reason().unwrap_or("");
    if let Err(e) = response.send_text(status, text) {
        logger::log_warning(&format!("Could not send {status} response: {e}"));
    }
}

/// Run the handler inside its own failure boundary.
///
/// Errors and panics become a 500 carrying the message when the head is
/// still unsent. The response is always closed and the permit always
/// returned.
async fn invoke_handler(
    handler: Arc<dyn Handler>,
    request: IncomingRequest,
    mut response: OutgoingResponse,
    permit: Permit,
    access_log: Option<Arc<str>>,
) {
    let started = Instant::now();
    let entry = access_log
        .as_ref()
        .map(|_| AccessLogEntry::from_request(request.head(), request.remote_addr()));
    let method = request.method().clone();
    let path = request.path().to_string();

    let outcome = AssertUnwindSafe(handler.handle(request, &mut response))
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(panic) => Some(panic_message(panic.as_ref())),
    };

    if let Some(message) = failure {
        logger::log_handler_failed(&method, &path, &message, response.headers_sent());
        if !response.headers_sent() && !response.is_closed() {
            if let Err(e) = response.send_text(StatusCode::INTERNAL_SERVER_ERROR, &message) {
                logger::log_warning(&format!("Could not send 500 response: {e}"));
            }
        }
    }
    response.close();

    if let (Some(format), Some(entry)) = (access_log, entry) {
        let entry = entry.finish(
            response.status().as_u16(),
            response.bytes_written(),
            started.elapsed(),
        );
        logger::log_access(&entry, &format);
    }

    permit.release();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
