//! Admission control for concurrently running processes.
//!
//! # Responsibilities
//! - Bound the number of live bridges to `max_forks` (0 = unlimited)
//! - Reject immediately instead of queueing when the pool is exhausted
//! - Release capacity on every exit path via an RAII slot
//!
//! # Design Decisions
//! - Backed by a semaphore, like the listener's connection limit
//! - A slot is released exactly once by construction (consumed or dropped)
//! - Releasing more than was acquired is a fatal logic fault, not an error

use std::sync::Arc;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

/// Bounded admission gate shared by all request handlers.
#[derive(Debug, Clone)]
pub struct ForkLimiter {
    /// `None` when unlimited.
    permits: Option<Arc<Semaphore>>,
    /// Slots currently held, tracked for both limited and unlimited modes.
    /// Published so shutdown can wait for the count to reach zero.
    outstanding: Arc<watch::Sender<usize>>,
    max_forks: usize,
}

impl ForkLimiter {
    /// Create a limiter allowing `max_forks` concurrent slots (0 = unlimited).
    pub fn new(max_forks: usize) -> Self {
        Self {
            permits: (max_forks > 0).then(|| Arc::new(Semaphore::new(max_forks))),
            outstanding: Arc::new(watch::Sender::new(0)),
            max_forks,
        }
    }

    /// Try to take a slot without waiting.
    ///
    /// Returns `None` when all slots are in use; the caller answers 429.
    pub fn try_acquire(&self) -> Option<AdmissionSlot> {
        let permit = match &self.permits {
            Some(semaphore) => Some(semaphore.clone().try_acquire_owned().ok()?),
            None => None,
        };
        self.outstanding.send_modify(|held| *held += 1);
        Some(AdmissionSlot {
            _permit: permit,
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Number of slots currently held.
    pub fn active(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once no slot is held.
    pub async fn wait_idle(&self) {
        let mut held = self.outstanding.subscribe();
        let _ = held.wait_for(|held| *held == 0).await;
    }

    /// Configured maximum (0 = unlimited).
    pub fn max_forks(&self) -> usize {
        self.max_forks
    }
}

/// One unit of bridge capacity.
///
/// Released when dropped or passed to [`AdmissionSlot::release`], which also
/// covers panics in the task holding it.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: Option<OwnedSemaphorePermit>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl AdmissionSlot {
    /// Give the slot back explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        let mut previous = 0;
        self.outstanding.send_modify(|held| {
            previous = *held;
            *held = held.saturating_sub(1);
        });
        assert!(
            previous > 0,
            "admission slot released without a matching acquire"
        );
        tracing::trace!(remaining = previous - 1, "Admission slot released");
    }
}
