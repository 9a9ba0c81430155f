//! Server module
//!
//! Binds the configured prefixes, accepts connections and runs the dispatch
//! loop until the shutdown signal fires.
//!
//! ```no_run
//! use tinyserve::config::ServerConfig;
//! use tinyserve::handler::handler_fn;
//! use tinyserve::server::{Server, Shutdown};
//! use tinyserve::http::serve_file;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new(["http://localhost:8080/media/"]).with_max_concurrency(16);
//! let handler = handler_fn(|request, response| {
//!     Box::pin(async move {
//!         let file = format!("./public{}", request.path());
//!         serve_file(response, file, request.head()).await?;
//!         Ok(())
//!     })
//! });
//!
//! let shutdown = Shutdown::new();
//! shutdown.listen_for_signals()?;
//! Server::bind(&config, handler)
//!     .await?
//!     .on_started(|addrs| println!("listening on {addrs:?}"))
//!     .serve(shutdown)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod connection;
pub mod listener;
pub mod prefix;
pub mod signal;

// `loop` is a keyword, so the module is named server_loop
#[path = "loop.rs"]
pub mod server_loop;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::{Error, ServerError, StartupError};
use crate::handler::Handler;
use crate::logger;

// Re-export commonly used types
pub use admission::{AdmissionController, Permit};
pub use listener::{bind_prefixes, create_reusable_listener, BoundListener};
pub use prefix::{EndpointFilter, EndpointRule, HostPattern, ListenerPrefix};
pub use server_loop::{run_dispatch_loop, DispatchContext};
pub use signal::Shutdown;

use connection::{run_acceptor, ConnectionSettings};

type StartedCallback = Box<dyn FnOnce(&[SocketAddr]) + Send>;

/// A bound server, ready to serve
pub struct Server {
    listeners: Vec<BoundListener>,
    handler: Arc<dyn Handler>,
    admission: AdmissionController,
    endpoint_filter: Option<EndpointFilter>,
    settings: ConnectionSettings,
    queue_depth: usize,
    access_log: Option<Arc<str>>,
    on_started: Option<StartedCallback>,
}

impl Server {
    /// Validate the configuration and bind every listener.
    ///
    /// Nothing is served until [`serve`](Self::serve) is called. All
    /// configuration problems surface here.
    #[allow(clippy::unused_async)]
    pub async fn bind<H: Handler>(config: &ServerConfig, handler: H) -> Result<Self, StartupError> {
        if config.prefixes.is_empty() {
            return Err(StartupError::NoPrefixes);
        }
        let prefixes = config
            .prefixes
            .iter()
            .map(|p| ListenerPrefix::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let admission = AdmissionController::new(config.max_concurrency)?;
        let endpoint_filter = EndpointFilter::parse(config.endpoint_filter.as_slice())?;

        let listeners = bind_prefixes(&prefixes, config.performance.listen_backlog)?;

        Ok(Self {
            listeners,
            handler: Arc::new(handler),
            admission,
            endpoint_filter,
            settings: ConnectionSettings {
                keep_alive: config.performance.keep_alive,
                header_read_timeout: config.header_read_timeout(),
            },
            queue_depth: config.performance.queue_depth.max(1),
            access_log: config
                .logging
                .access_log
                .then(|| Arc::from(config.logging.access_log_format.as_str())),
            on_started: None,
        })
    }

    /// Called once with the bound addresses when serving begins
    #[must_use]
    pub fn on_started<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&[SocketAddr]) + Send + 'static,
    {
        self.on_started = Some(Box::new(callback));
        self
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr).collect()
    }

    /// Prefixes as bound, with any port 0 replaced by the real port
    pub fn prefixes(&self) -> Vec<ListenerPrefix> {
        self.listeners
            .iter()
            .flat_map(|l| l.prefixes.iter().cloned())
            .collect()
    }

    /// Serve until `shutdown` fires or a listener fails.
    ///
    /// Returns as soon as dispatching stops; handlers already running keep
    /// going in the background and finish on their own.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let addrs = self.local_addrs();
        let (queue_tx, queue_rx) = mpsc::channel(self.queue_depth);

        let acceptors = self
            .listeners
            .into_iter()
            .map(|bound| {
                tokio::spawn(run_acceptor(
                    bound.listener,
                    bound.prefixes.into(),
                    queue_tx.clone(),
                    self.settings,
                    shutdown.clone(),
                ))
            })
            .collect::<Vec<_>>();
        drop(queue_tx);

        logger::log_server_start(&addrs, self.admission.capacity());
        if let Some(callback) = self.on_started {
            callback(&addrs);
        }

        let ctx = DispatchContext {
            handler: self.handler,
            admission: self.admission,
            endpoint_filter: self.endpoint_filter,
            access_log: self.access_log,
        };
        let result = run_dispatch_loop(queue_rx, ctx, shutdown).await;

        // Closes the listening sockets
        for acceptor in &acceptors {
            acceptor.abort();
        }
        result
    }
}

/// Bind and serve in one call
pub async fn run<H: Handler>(
    config: &ServerConfig,
    handler: H,
    shutdown: Shutdown,
) -> Result<(), Error> {
    Server::bind(config, handler).await?.serve(shutdown).await?;
    Ok(())
}
