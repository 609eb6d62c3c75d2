//! # Spindle
//!
//! A bounded, lock-free task queue drained by a fixed pool of worker threads.
//!
//! Producers push tasks into a power-of-two ring buffer without taking a lock
//! and without ever blocking; when the ring is full the task is handed back.
//! Workers sleep on a counting semaphore and wake once per enqueued task.
//! Every task gets a [`TaskId`] that can later be used to ask whether it has
//! finished or to request that it cancel itself.
//!
//! ## Features
//!
//! - **Lock-free hot path**: enqueue and dequeue never touch a mutex
//! - **Fixed memory**: the footprint is known up front from the configuration
//! - **Cooperative cancellation**: task bodies poll a [`CancelToken`]
//! - **Caller assistance**: [`TaskQueue::try_work`] runs one task inline
//! - **Metrics**: activity counters (optional, on by default)
//!
//! ```
//! use spindle::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), spindle::ConfigError> {
//! let queue: TaskQueue<Job> = TaskQueueBuilder::new()
//!     .buffer_size(64)
//!     .worker_threads(2)
//!     .build()?;
//! queue.start();
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let ids: Vec<TaskId> = (0..10)
//!     .map(|_| {
//!         let hits = hits.clone();
//!         queue
//!             .spawn(move |_| {
//!                 hits.fetch_add(1, Ordering::Relaxed);
//!             })
//!             .unwrap()
//!     })
//!     .collect();
//!
//! while !ids.iter().all(|&id| queue.is_completed(id)) {
//!     std::thread::yield_now();
//! }
//! assert_eq!(hits.load(Ordering::Relaxed), 10);
//! queue.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub use spindle_core::{
    run_job, CancelToken, ConfigError, ConfigResult, Job, QueueConfig, QueueFull, QueueLayout,
    RingBuffer, Task, TaskFn, TaskId, TaskStatus, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE,
};
#[cfg(feature = "metrics")]
pub use spindle_executor::QueueStats;
pub use spindle_executor::TaskQueue;
pub use spindle_sync::{Semaphore, WaitGroup};

/// Builder for configuring a [`TaskQueue`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct TaskQueueBuilder {
    config: QueueConfig,
}

impl TaskQueueBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring buffer capacity. Must be a power of two, at least 4.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Set the number of worker threads; `0` means one per logical core.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.num_workers = count;
        self
    }

    /// Set the thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set the stack size of each worker thread.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate the configuration and report the queue's memory layout.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is rejected.
    pub fn layout<D: Send + 'static>(&self) -> ConfigResult<QueueLayout> {
        TaskQueue::<D>::layout(&self.config)
    }

    /// Build a stopped queue. Call [`TaskQueue::start`] to spawn the workers.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is rejected.
    pub fn build<D: Send + 'static>(self) -> ConfigResult<TaskQueue<D>> {
        TaskQueue::new(self.config)
    }
}

pub mod prelude {
    //! Common imports for Spindle users.

    pub use crate::{
        CancelToken, Job, QueueConfig, QueueFull, TaskId, TaskQueue, TaskQueueBuilder,
        TaskStatus,
    };
}
