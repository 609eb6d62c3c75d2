//! # Spindle Core
//!
//! Building blocks of the Spindle task queue: task identity and cooperative
//! cancellation, the bounded lock-free MPMC ring buffer that carries tasks, and
//! the configuration / footprint computation for a queue.
//!
//! The worker pool that drains the ring lives in `spindle-executor`.
//!
//! ## Design Principles
//!
//! - **Lock-free hot path**: enqueue and dequeue are a CAS on a position counter
//!   plus acquire/release on a per-cell sequence number
//! - **Bounded memory**: every cell is allocated up front; a full ring pushes
//!   back on the producer instead of growing
//! - **Advisory cancellation**: tasks poll a [`CancelToken`]; nothing is ever
//!   interrupted

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod ring;
pub mod task;

pub use config::{LayoutParts, QueueConfig, QueueLayout, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use error::{ConfigError, ConfigResult, QueueFull};
pub use ring::{Claimed, RingBuffer};
pub use task::{run_job, CancelMark, CancelToken, Job, Task, TaskFn, TaskId, TaskStatus};
