// Connection handling module
// Accepts TCP connections, serves HTTP/1.1 on each and turns every parsed
// request into an exchange for the dispatch loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::prefix::ListenerPrefix;
use super::signal::Shutdown;
use crate::error::ResponseError;
use crate::handler::{IncomingRequest, OutgoingResponse};
use crate::http::{build_404_response, ResponseBody};
use crate::logger;

/// A request paired with the response that answers it
pub struct Exchange {
    pub request: IncomingRequest,
    pub response: OutgoingResponse,
}

/// What the dispatch loop receives: an exchange, or the accept failure
/// that stopped a listener
pub type Accepted = Result<Exchange, io::Error>;

/// Per-connection HTTP settings
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub keep_alive: bool,
    pub header_read_timeout: Duration,
}

/// Accept connections until shutdown.
///
/// Errors tied to a single connection attempt are logged and skipped. Any
/// other accept error is forwarded to the dispatch loop and ends this
/// acceptor.
pub async fn run_acceptor(
    listener: TcpListener,
    prefixes: Arc<[ListenerPrefix]>,
    queue: mpsc::Sender<Accepted>,
    settings: ConnectionSettings,
    shutdown: Shutdown,
) {
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            let _ = queue.send(Err(e)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            biased;

            () = shutdown.triggered() => break,

            accept_result = listener.accept() => match accept_result {
                Ok((stream, peer_addr)) => {
                    logger::log_connection_accepted(&peer_addr);
                    handle_connection(
                        stream,
                        local_addr,
                        peer_addr,
                        Arc::clone(&prefixes),
                        queue.clone(),
                        settings,
                        shutdown.clone(),
                    );
                }
                Err(e) if is_transient(&e) => logger::log_connection_error(&e),
                Err(e) => {
                    logger::log_error(&format!("Listener {local_addr} stopped: {e}"));
                    // The loop may already be gone during shutdown
                    let _ = queue.send(Err(e)).await;
                    break;
                }
            },
        }
    }
}

/// Accept errors that concern one connection, not the listener
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Serve a single connection in a spawned task.
///
/// On shutdown the connection finishes its in-flight response and closes;
/// idle keep-alive connections close at once.
fn handle_connection(
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    prefixes: Arc<[ListenerPrefix]>,
    queue: mpsc::Sender<Accepted>,
    settings: ConnectionSettings,
    shutdown: Shutdown,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder
            .keep_alive(settings.keep_alive)
            .timer(TokioTimer::new())
            .header_read_timeout(settings.header_read_timeout);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let prefixes = Arc::clone(&prefixes);
                let queue = queue.clone();
                async move { forward_request(req, local_addr, peer_addr, &prefixes, &queue).await }
            }),
        );
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.triggered() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(err) = result {
            if !err.is_incomplete_message() {
                logger::log_connection_error(&err);
            }
        }
    });
}

/// Hand a request to the dispatch loop and wait for its response head.
///
/// Paths outside every prefix of this listener are answered here. If the
/// exchange is dropped unanswered the connection is closed.
async fn forward_request(
    req: Request<Incoming>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    prefixes: &[ListenerPrefix],
    queue: &mpsc::Sender<Accepted>,
) -> Result<Response<ResponseBody>, ResponseError> {
    if !prefixes.iter().any(|p| p.matches_path(req.uri().path())) {
        return Ok(build_404_response());
    }

    let (response, head) = OutgoingResponse::channel();
    let request = IncomingRequest::from_hyper(req, local_addr, peer_addr);
    queue
        .send(Ok(Exchange { request, response }))
        .await
        .map_err(|_| ResponseError::Abandoned)?;

    head.await.map_err(|_| ResponseError::Abandoned)
}
