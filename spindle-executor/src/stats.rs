//! Queue activity counters.
//!
//! With the `metrics` feature disabled the counters compile to nothing and
//! [`TaskQueue::stats`](crate::TaskQueue::stats) is not available.

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Enqueued,
    Rejected,
    Executed,
    Assisted,
    Panicked,
    CancelRequests,
}

/// Snapshot of a queue's counters since construction.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted by `enqueue`
    pub enqueued: u64,
    /// Enqueues refused because the ring was full
    pub rejected: u64,
    /// Tasks run by worker threads
    pub executed: u64,
    /// Tasks run inline through `try_work`
    pub assisted: u64,
    /// Tasks whose body panicked
    pub panicked: u64,
    /// Calls to `cancel`
    pub cancel_requests: u64,
}

#[cfg(feature = "metrics")]
impl QueueStats {
    /// Tasks that have finished running, on workers or inline.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.executed + self.assisted
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    #[cfg(feature = "metrics")]
    counters: [AtomicU64; 6],
}

impl StatsCounters {
    #[cfg(feature = "metrics")]
    pub(crate) fn record(&self, counter: Counter) {
        self.counters[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(not(feature = "metrics"))]
    #[inline]
    pub(crate) fn record(&self, _counter: Counter) {}

    #[cfg(feature = "metrics")]
    pub(crate) fn snapshot(&self) -> QueueStats {
        let get = |counter: Counter| self.counters[counter as usize].load(Ordering::Relaxed);
        QueueStats {
            enqueued: get(Counter::Enqueued),
            rejected: get(Counter::Rejected),
            executed: get(Counter::Executed),
            assisted: get(Counter::Assisted),
            panicked: get(Counter::Panicked),
            cancel_requests: get(Counter::CancelRequests),
        }
    }
}
