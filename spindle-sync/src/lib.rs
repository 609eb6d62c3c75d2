//! Blocking primitives for the Spindle task queue.
//!
//! The task queue itself is lock-free on its hot path. The only place where a
//! thread is allowed to sleep is an idle worker waiting for work, which is what
//! [`Semaphore`] is for. [`WaitGroup`] lets callers block until a known number
//! of tasks have reported in.

#![deny(missing_docs)]

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Condvar, Mutex, MutexGuard, PoisonError,
};
use std::time::{Duration, Instant};

/// A counting semaphore.
///
/// `signal` adds one permit and wakes at most one waiter, `signal_n` adds `n`
/// permits at once. `wait` blocks until a permit is available and consumes it.
/// Permits are never lost: a signal with no waiter is banked for the next
/// `wait`.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits.
    #[must_use]
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    // The protected state is a plain counter, a panic while holding the lock
    // cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    /// Block for at most `timeout` waiting for a permit.
    ///
    /// Returns `true` if a permit was taken.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.lock();
        while *permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(permits, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            permits = guard;
        }
        *permits -= 1;
        true
    }

    /// Take a permit if one is available without blocking.
    pub fn try_wait(&self) -> bool {
        let mut permits = self.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Release one permit, waking one waiter.
    pub fn signal(&self) {
        *self.lock() += 1;
        self.condvar.notify_one();
    }

    /// Release `n` permits, waking up to `n` waiters.
    pub fn signal_n(&self, n: usize) {
        if n == 0 {
            return;
        }
        *self.lock() += n;
        if n == 1 {
            self.condvar.notify_one();
        } else {
            self.condvar.notify_all();
        }
    }

    /// Number of banked permits. Racy by nature, for diagnostics only.
    pub fn available(&self) -> usize {
        *self.lock()
    }
}

/// A wait group for synchronizing multiple threads.
#[derive(Debug, Default)]
pub struct WaitGroup {
    counter: AtomicU64,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl WaitGroup {
    /// Create a new wait group.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Add to the wait group counter.
    pub fn add(&self, delta: u64) {
        self.counter.fetch_add(delta, Ordering::AcqRel);
    }

    /// Mark one task as done.
    pub fn done(&self) {
        let prev = self.counter.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            // Taking the lock orders this notify after any waiter's check.
            let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
            self.condvar.notify_all();
        }
    }

    /// Wait for the counter to reach zero.
    pub fn wait(&self) {
        let mut guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        while self.counter.load(Ordering::Acquire) > 0 {
            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait for the counter to reach zero, giving up after `timeout`.
    ///
    /// Returns `true` if the counter reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        while self.counter.load(Ordering::Acquire) > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
        true
    }

    /// Get the current counter value.
    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}
