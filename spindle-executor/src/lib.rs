//! Worker pool for the Spindle task queue.
//!
//! A [`TaskQueue`] owns a lock-free [`RingBuffer`] and a fixed set of OS
//! threads that drain it. Producers never block: a full ring hands the task
//! back. Idle workers sleep on a counting semaphore that every successful
//! enqueue signals once.
//!
//! ```no_run
//! use spindle_core::{CancelToken, QueueConfig};
//! use spindle_executor::TaskQueue;
//!
//! fn greet(name: &'static str, _: &CancelToken<'_>) {
//!     println!("hello, {name}");
//! }
//!
//! let queue = TaskQueue::new(QueueConfig::new(64, 2))?;
//! queue.start();
//! let id = queue.enqueue(greet, "world").expect("queue has room");
//! while !queue.is_completed(id) {
//!     std::thread::yield_now();
//! }
//! queue.shutdown();
//! # Ok::<(), spindle_core::ConfigError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod stats;
mod worker;

use std::alloc::Layout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use spindle_core::{
    run_job, CancelMark, CancelToken, ConfigResult, Job, LayoutParts, QueueConfig, QueueFull,
    QueueLayout, RingBuffer, Task, TaskFn, TaskId, TaskStatus,
};
use spindle_sync::Semaphore;
use spindle_utils::CacheAligned;

#[cfg(feature = "metrics")]
pub use stats::QueueStats;
use stats::{Counter, StatsCounters};
use worker::WorkerSlot;

/// State shared between the queue handle and its workers.
pub(crate) struct Shared<D> {
    ring: RingBuffer<D>,
    stopped: CacheAligned<AtomicBool>,
    semaphore: Semaphore,
    slots: Box<[CacheAligned<WorkerSlot>]>,
    stats: StatsCounters,
}

impl<D> Shared<D> {
    fn status(&self, id: TaskId) -> TaskStatus {
        if self.ring.is_queued(id) {
            TaskStatus::Queued
        } else if self.slots.iter().any(|slot| slot.holds(id)) {
            TaskStatus::Running
        } else {
            TaskStatus::Completed
        }
    }
}

/// A fixed-capacity task queue serviced by a pool of worker threads.
///
/// # Behavior Guarantees
/// - `enqueue` never blocks; a full ring returns [`QueueFull`] with the data
/// - With one worker, tasks run in enqueue order
/// - `start` / `stop` are idempotent: the call that finds the queue already in
///   the requested state returns `false` and does nothing
/// - Dropping the queue stops the workers and drops any task still queued
///
/// Tasks may be enqueued while the queue is stopped; they wait for `start` or
/// for a caller to run them through [`try_work`](Self::try_work).
pub struct TaskQueue<D: Send + 'static> {
    shared: Arc<Shared<D>>,
    // Only `start` and `stop` take this lock.
    handles: Mutex<Vec<JoinHandle<()>>>,
    config: QueueConfig,
    layout: QueueLayout,
}

impl<D: Send + 'static> TaskQueue<D> {
    /// Build a stopped queue from `config`.
    ///
    /// Every cell, worker slot and handle is allocated here, once.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](spindle_core::ConfigError) when the
    /// configuration is rejected.
    pub fn new(config: QueueConfig) -> ConfigResult<Self> {
        let layout = Self::layout(&config)?;
        let ring = RingBuffer::new(layout.buffer_size)?;
        let slots = (0..layout.num_workers)
            .map(|_| CacheAligned::new(WorkerSlot::default()))
            .collect();

        tracing::debug!(
            buffer_size = layout.buffer_size,
            workers = layout.num_workers,
            footprint = layout.footprint,
            "task queue created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                ring,
                stopped: CacheAligned::new(AtomicBool::new(true)),
                semaphore: Semaphore::new(0),
                slots,
                stats: StatsCounters::default(),
            }),
            handles: Mutex::new(Vec::with_capacity(layout.num_workers)),
            config,
            layout,
        })
    }

    /// Validate `config` and compute the memory a queue built from it needs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](spindle_core::ConfigError) when the
    /// configuration is rejected.
    pub fn layout(config: &QueueConfig) -> ConfigResult<QueueLayout> {
        config.layout(LayoutParts {
            header: Layout::new::<Shared<D>>(),
            cell: RingBuffer::<D>::cell_layout(),
            handle: Layout::new::<JoinHandle<()>>(),
            slot: Layout::new::<CacheAligned<WorkerSlot>>(),
        })
    }

    /// Total bytes allocated for this queue.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.layout.footprint
    }

    /// The configuration this queue was built from.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Number of worker threads started by [`start`](Self::start).
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.layout.num_workers
    }

    /// Ring buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Approximate number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    /// Whether the ring looked empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.ring.is_empty()
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker threads.
    ///
    /// Returns `false` if the queue was already running.
    pub fn start(&self) -> bool {
        let mut handles = self.handles();
        if self
            .shared
            .stopped
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("start ignored: task queue already running");
            return false;
        }

        for index in 0..self.layout.num_workers {
            let mut builder =
                thread::Builder::new().name(format!("{}-{index}", self.config.thread_name_prefix));
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = Arc::clone(&self.shared);
            match builder.spawn(move || worker::run(&shared, index)) {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::warn!(worker = index, "failed to spawn worker: {err}"),
            }
        }

        tracing::debug!(workers = handles.len(), "task queue started");
        true
    }

    /// Stop and join every worker, optionally dropping all queued tasks.
    ///
    /// Waits without a timeout for each worker to finish its current task.
    /// Returns `false` if the queue was already stopped. When called from a
    /// task running on one of this queue's workers, that worker is left to
    /// exit by itself.
    pub fn stop(&self, flush: bool) -> bool {
        let mut handles = self.handles();
        if self
            .shared
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("stop ignored: task queue already stopped");
            return false;
        }

        // One wake per worker, so every sleeper sees the stop flag.
        self.shared.semaphore.signal_n(self.layout.num_workers);
        let current = thread::current().id();
        for handle in handles.drain(..) {
            if handle.thread().id() == current {
                // Stopped from one of our own tasks: this worker exits on its
                // own once the task returns.
                tracing::debug!("not joining the calling worker thread");
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("worker thread terminated abnormally");
            }
        }

        if flush {
            let dropped = self.shared.ring.drain();
            tracing::debug!(dropped, "task queue flushed");
        }
        tracing::debug!("task queue stopped");
        true
    }

    /// Stop the workers and drop every queued task.
    pub fn shutdown(&self) {
        if !self.stop(true) {
            // Already stopped: nothing else can be draining.
            self.shared.ring.drain();
        }
    }

    /// Enqueue `func(data)`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying `data` back when the ring is full.
    pub fn enqueue(&self, func: TaskFn<D>, data: D) -> Result<TaskId, QueueFull<D>> {
        match self.shared.ring.push(Task::new(func, data)) {
            Ok(id) => {
                self.shared.semaphore.signal();
                self.shared.stats.record(Counter::Enqueued);
                tracing::trace!(task = %id, "task enqueued");
                Ok(id)
            }
            Err(task) => {
                self.shared.stats.record(Counter::Rejected);
                Err(QueueFull(task.into_data()))
            }
        }
    }

    /// Run one queued task on the calling thread.
    ///
    /// Returns `false` if nothing was queued. A task run this way is not
    /// recorded in any worker slot: once taken, lookups report it completed
    /// and [`cancel`](Self::cancel) no longer reaches it.
    pub fn try_work(&self) -> bool {
        let Some(claimed) = self.shared.ring.pop() else {
            return false;
        };

        let mark = CancelMark::new();
        if claimed.canceled {
            mark.mark(claimed.id);
        }
        worker::execute(&self.shared, claimed.task, &CancelToken::new(&mark, claimed.id));
        self.shared.stats.record(Counter::Assisted);
        true
    }

    /// Where task `id` currently is.
    #[must_use]
    pub fn status(&self, id: TaskId) -> TaskStatus {
        self.shared.status(id)
    }

    /// Whether task `id` has finished.
    ///
    /// Best effort: an id found neither queued nor on a worker is reported as
    /// completed, including ids that were never issued.
    #[must_use]
    pub fn is_completed(&self, id: TaskId) -> bool {
        self.status(id) == TaskStatus::Completed
    }

    /// Ask task `id` to cancel.
    ///
    /// Returns `true` if the task was found queued or running. The task only
    /// notices if its body polls [`CancelToken::is_canceled`].
    pub fn cancel(&self, id: TaskId) -> bool {
        self.shared.stats.record(Counter::CancelRequests);

        // Both sides are always checked: a worker claiming the task right now
        // either sees the cell mark or is already visible in its slot.
        let queued = self.shared.ring.mark_canceled(id);
        let running = self.shared.slots.iter().any(|slot| slot.cancel(id));
        queued || running
    }

    /// Counters since construction.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.stats.snapshot()
    }
}

impl TaskQueue<Job> {
    /// Enqueue a closure.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the boxed closure back when the ring is
    /// full.
    pub fn spawn<F>(&self, f: F) -> Result<TaskId, QueueFull<Job>>
    where
        F: FnOnce(&CancelToken<'_>) + Send + 'static,
    {
        self.enqueue(run_job, Box::new(f))
    }
}

impl<D: Send + 'static> Drop for TaskQueue<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: Send + 'static> std::fmt::Debug for TaskQueue<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("capacity", &self.capacity())
            .field("workers", &self.worker_count())
            .field("running", &self.is_running())
            .field("len", &self.len())
            .finish()
    }
}
