//! Reference-counted latency holds for multiple independent holders.
//!
//! A bare [`LatencyGuard`] has a single open/closed flag, so when two
//! callers share one, the first `release()` drops the constraint out from
//! under the other. [`SharedLatencyGuard`] hands each holder its own
//! [`LatencyHold`] token. The constraint stays up while any token is
//! alive and is released when the last one drops.

use crate::latency::LatencyGuard;
use cstate_common::error::QosResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct SharedState {
    guard: LatencyGuard,
    holders: usize,
}

/// Cloneable handle to a guard shared between holders.
#[derive(Debug, Clone)]
pub struct SharedLatencyGuard {
    inner: Arc<Mutex<SharedState>>,
}

impl SharedLatencyGuard {
    /// Wrap `guard` for shared use. The guard should not be held yet.
    #[must_use]
    pub fn new(guard: LatencyGuard) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState { guard, holders: 0 })),
        }
    }

    /// Take a hold on the constraint, acquiring it if this is the first.
    ///
    /// # Errors
    ///
    /// Propagates the acquire error of the first holder; the holder count
    /// is left unchanged.
    pub fn hold(&self) -> QosResult<LatencyHold> {
        let mut state = self.lock();
        if state.holders == 0 {
            state.guard.acquire()?;
        }
        state.holders += 1;
        debug!(holders = state.holders, "Latency hold taken");

        Ok(LatencyHold {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of live holds.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.lock().holders
    }

    /// Whether the underlying constraint is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.lock().guard.is_held()
    }

    /// Number of times the underlying device was opened.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.lock().guard.acquisitions()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        // Counter and handle stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One holder's share of a [`SharedLatencyGuard`].
///
/// Dropping the last hold releases the constraint.
#[derive(Debug)]
#[must_use = "the constraint is released as soon as the hold is dropped"]
pub struct LatencyHold {
    inner: Arc<Mutex<SharedState>>,
}

impl Drop for LatencyHold {
    fn drop(&mut self) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.holders = state.holders.saturating_sub(1);
        debug!(holders = state.holders, "Latency hold dropped");
        if state.holders == 0 {
            state.guard.release();
        }
    }
}
