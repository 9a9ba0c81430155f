//! Shutdown signal
//!
//! A cloneable flag plus wakeup, shared by the acceptors, the connections and
//! the dispatch loop. Once triggered it stays triggered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    notify: Notify,
    triggered: AtomicBool,
}

/// Cancellation signal handed to [`Server::serve`](super::Server::serve)
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns immediately; does not wait for the server.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown was requested, immediately if it already was
    pub async fn triggered(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not lost
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// Trigger on SIGINT or SIGTERM
    ///
    /// Spawns a background task; must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let shutdown = self.clone();

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
                () = shutdown.triggered() => return,
            };
            tracing::info!(signal = name, "Initiating graceful shutdown");
            shutdown.trigger();
        });
        Ok(())
    }

    /// Windows fallback - only handles Ctrl+C
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!(signal = "Ctrl+C", "Initiating graceful shutdown");
                        shutdown.trigger();
                    }
                }
                () = shutdown.triggered() => {}
            }
        });
        Ok(())
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
