use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Why a sweep stopped before visiting every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepInterruption {
    Cancelled,
    BudgetExhausted,
}

/// Cooperative cancellation flag and optional wall-clock budget, checked between cases.
#[derive(Debug, Clone, Default)]
pub struct SweepControl {
    cancelled: Arc<AtomicBool>,
    budget: Option<Duration>,
}

impl SweepControl {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Requests that any sweep holding a clone of this control stop at the next case boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn start(&self) -> SweepClock<'_> {
        SweepClock {
            control: self,
            started: Instant::now(),
        }
    }
}

pub(crate) struct SweepClock<'a> {
    control: &'a SweepControl,
    started: Instant,
}

impl SweepClock<'_> {
    pub(crate) fn check(&self) -> Option<SweepInterruption> {
        if self.control.is_cancelled() {
            return Some(SweepInterruption::Cancelled);
        }
        match self.control.budget {
            Some(budget) if self.started.elapsed() >= budget => {
                Some(SweepInterruption::BudgetExhausted)
            }
            _ => None,
        }
    }
}

/// Serializes sweeps so at most one runs at a time per lock.
#[derive(Debug, Clone, Default)]
pub struct SweepLock {
    inner: Arc<Mutex<()>>,
}

impl SweepLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn try_acquire(&self) -> Result<MutexGuard<'_, ()>, SweepError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(SweepError::AlreadyRunning),
            // A panicked sweep leaves no partial state behind the lock itself.
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweepError {
    #[error("another sweep is already running")]
    AlreadyRunning,
}
