//! Worker threads and the per-worker slots that keep running tasks visible.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spindle_core::{CancelMark, CancelToken, Task, TaskId};

use crate::stats::Counter;
use crate::Shared;

/// What a worker is running right now.
///
/// Once a task leaves the ring this is the only place it can still be found
/// by id. `current` holds the raw id (0 when idle); `cancel` is the mark the
/// running task's [`CancelToken`] observes.
#[derive(Debug, Default)]
pub(crate) struct WorkerSlot {
    current: AtomicUsize,
    cancel: CancelMark,
}

impl WorkerSlot {
    pub(crate) fn begin(&self, id: TaskId) {
        self.current.store(id.get(), Ordering::SeqCst);
    }

    pub(crate) fn finish(&self) {
        self.current.store(0, Ordering::SeqCst);
    }

    pub(crate) fn holds(&self, id: TaskId) -> bool {
        self.current.load(Ordering::SeqCst) == id.get()
    }

    /// Mark `id` canceled if this slot is running it.
    pub(crate) fn cancel(&self, id: TaskId) -> bool {
        self.cancel.mark_while(id, || self.holds(id))
    }
}

/// Body of worker thread `index`.
pub(crate) fn run<D: Send + 'static>(shared: &Arc<Shared<D>>, index: usize) {
    let slot = &shared.slots[index];
    tracing::debug!(worker = index, "worker started");

    while !shared.stopped.load(Ordering::Acquire) {
        // The slot is filled while the cell still reports the task as queued,
        // so a lookup always finds it in one place or the other.
        match shared.ring.pop_with(|id| slot.begin(id)) {
            Some(claimed) => {
                if claimed.canceled {
                    slot.cancel.mark(claimed.id);
                }
                execute(shared, claimed.task, &CancelToken::new(&slot.cancel, claimed.id));
                shared.stats.record(Counter::Executed);
                slot.finish();
            }
            None => shared.semaphore.wait(),
        }
    }

    tracing::debug!(worker = index, "worker exiting");
}

/// Run one task, containing any panic it raises.
pub(crate) fn execute<D>(shared: &Shared<D>, task: Task<D>, token: &CancelToken<'_>) {
    let id = token.id();
    tracing::trace!(task = %id, "running task");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run(token))) {
        tracing::error!(task = %id, "task panicked: {}", panic_message(payload.as_ref()));
        shared.stats.record(Counter::Panicked);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown payload"
    }
}
