//! Admission control
//!
//! Caps the number of handler invocations in flight. A permit is taken
//! before the handler starts and returned when it finishes, including when
//! it fails or panics.

use super::signal::Shutdown;
use crate::error::{AdmissionError, StartupError};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting limiter over a fixed number of permits
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionController {
    /// # Errors
    ///
    /// `StartupError::InvalidConcurrency` when `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, StartupError> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(StartupError::InvalidConcurrency);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait for a free permit, or until `shutdown` is triggered.
    ///
    /// Waiters are served in arrival order. A cancelled wait never holds a
    /// permit.
    pub async fn acquire(&self, shutdown: &Shutdown) -> Result<Permit, AdmissionError> {
        tokio::select! {
            biased;

            () = shutdown.triggered() => Err(AdmissionError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                let permit = permit.map_err(|_| AdmissionError::Cancelled)?;
                tracing::trace!(available = self.semaphore.available_permits(), "Permit acquired");
                Ok(Permit { _permit: permit })
            }
        }
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One unit of concurrency. Returned to the pool when dropped.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Return the permit now. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}
