//! Bounded lock-free MPMC ring buffer.
//!
//! This is Dmitry Vyukov's bounded queue. Each cell carries a sequence number
//! that encodes whose turn it is:
//!
//! - `sequence == pos`: free for the producer that claims position `pos`
//! - `sequence == pos + 1`: filled, ready for the consumer at position `pos`
//!
//! Producers and consumers race on their own position counter with a CAS, and
//! never touch each other's counter. The payload write happens before the
//! release store of the sequence, and the consumer's acquire load of the
//! sequence happens before the payload read; that is the only cross-thread
//! data dependency in the protocol.
//!
//! Position `usize::MAX` has no [`TaskId`] (its complement is zero). A
//! producer that claims it publishes the cell empty and moves on, and the
//! consumer that claims it releases the cell and moves on, so the ring holds
//! one task fewer for the lap that crosses the wrap.
//!
//! # Performance Characteristics
//! - Push / pop: O(1), one CAS when uncontended
//! - No allocation after construction
//! - Positions padded to separate cache lines

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::cmp::Ordering as Cmp;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

use spindle_utils::CacheAligned;

use crate::config::MIN_BUFFER_SIZE;
use crate::error::{ConfigError, ConfigResult};
use crate::task::{CancelMark, Task, TaskId};

struct Cell<D> {
    sequence: AtomicUsize,
    cancel: CancelMark,
    task: UnsafeCell<MaybeUninit<Task<D>>>,
}

/// A task taken out of the ring by a consumer.
#[derive(Debug)]
#[must_use]
pub struct Claimed<D> {
    /// Id the task was issued under
    pub id: TaskId,
    /// The task itself
    pub task: Task<D>,
    /// Whether a cancel reached the task while it was queued
    pub canceled: bool,
}

/// Fixed-capacity multi-producer multi-consumer task ring.
pub struct RingBuffer<D> {
    enqueue_pos: CacheAligned<AtomicUsize>,
    dequeue_pos: CacheAligned<AtomicUsize>,
    cells: CacheAligned<Box<[Cell<D>]>>,
    mask: usize,
}

// SAFETY: cells are handed from exactly one producer to exactly one consumer,
// ordered by the sequence protocol. Tasks only need to move between threads.
unsafe impl<D: Send> Send for RingBuffer<D> {}
unsafe impl<D: Send> Sync for RingBuffer<D> {}

impl<D> RingBuffer<D> {
    /// Create an empty ring with `capacity` cells.
    ///
    /// # Errors
    ///
    /// Rejects capacities below 4 or not a power of two.
    pub fn new(capacity: usize) -> ConfigResult<Self> {
        if capacity < MIN_BUFFER_SIZE {
            return Err(ConfigError::BufferTooSmall { size: capacity });
        }
        if !capacity.is_power_of_two() {
            return Err(ConfigError::BufferNotPowerOfTwo { size: capacity });
        }

        Ok(Self::starting_at(capacity, 0))
    }

    /// A ring whose first push and pop happen at position `start`.
    ///
    /// `capacity` must already be validated.
    fn starting_at(capacity: usize, start: usize) -> Self {
        let mask = capacity - 1;
        // Each cell is free for the first position at or after `start` that
        // maps to it.
        let cells: Vec<Cell<D>> = (0..capacity)
            .map(|index| Cell {
                sequence: AtomicUsize::new(
                    start.wrapping_add(index.wrapping_sub(start) & mask),
                ),
                cancel: CancelMark::new(),
                task: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            enqueue_pos: CacheAligned::new(AtomicUsize::new(start)),
            dequeue_pos: CacheAligned::new(AtomicUsize::new(start)),
            cells: CacheAligned::new(cells.into_boxed_slice()),
            mask,
        }
    }

    /// Layout of one cell, for footprint computation.
    #[must_use]
    pub fn cell_layout() -> Layout {
        Layout::new::<Cell<D>>()
    }

    /// Number of cells.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Approximate number of queued tasks. Stale as soon as it is read.
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.dequeue_pos.load(Ordering::Relaxed);
        let tail = self.enqueue_pos.load(Ordering::Relaxed);
        tail.wrapping_sub(head).min(self.capacity())
    }

    /// Whether the ring looked empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, pos: usize) -> &Cell<D> {
        &self.cells[pos & self.mask]
    }

    /// Enqueue a task.
    ///
    /// # Errors
    ///
    /// Hands the task back when every cell is occupied.
    pub fn push(&self, task: Task<D>) -> Result<TaskId, Task<D>> {
        loop {
            let Some((cell, pos)) = self.claim_enqueue() else {
                return Err(task);
            };

            if let Some(id) = TaskId::from_position(pos) {
                // SAFETY: winning the CAS at `sequence == pos` makes this thread
                // the only writer of the cell until the release store below.
                unsafe { (*cell.task.get()).write(task) };
                cell.sequence.store(pos.wrapping_add(1), Ordering::Release);
                return Ok(id);
            }

            // No id for this position: publish the cell empty.
            cell.sequence.store(pos.wrapping_add(1), Ordering::Release);
        }
    }

    fn claim_enqueue(&self) -> Option<(&Cell<D>, usize)> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let cell = self.cell(pos);
            let seq = cell.sequence.load(Ordering::Acquire);
            #[allow(clippy::cast_possible_wrap)]
            let diff = (seq as isize).wrapping_sub(pos as isize);

            match diff.cmp(&0) {
                Cmp::Equal => match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some((cell, pos)),
                    Err(current) => pos = current,
                },
                // Still holding the task from one lap ago.
                Cmp::Less => return None,
                Cmp::Greater => pos = self.enqueue_pos.load(Ordering::Relaxed),
            }
        }
    }

    /// Dequeue a task.
    pub fn pop(&self) -> Option<Claimed<D>> {
        self.pop_with(|_| ())
    }

    /// Dequeue a task, running `on_claim` before the cell is released.
    ///
    /// Until the cell is released, lookups still report the task as queued, so
    /// anything `on_claim` records (a worker slot) becomes visible without a
    /// gap. `on_claim` must not panic: the cell would never be released.
    pub fn pop_with<F>(&self, on_claim: F) -> Option<Claimed<D>>
    where
        F: FnOnce(TaskId),
    {
        loop {
            let (cell, pos) = self.claim_dequeue()?;
            let release = pos.wrapping_add(self.mask).wrapping_add(1);

            let Some(id) = TaskId::from_position(pos) else {
                // Published empty by the producer.
                cell.sequence.store(release, Ordering::Release);
                continue;
            };

            // SAFETY: `sequence == pos + 1` was observed with acquire ordering,
            // so the payload is initialised, and the won CAS makes this the
            // only reader of it.
            let task = unsafe { (*cell.task.get()).assume_init_read() };
            on_claim(id);
            let canceled = cell.cancel.is_marked(id);

            cell.sequence.store(release, Ordering::Release);
            return Some(Claimed { id, task, canceled });
        }
    }

    fn claim_dequeue(&self) -> Option<(&Cell<D>, usize)> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let cell = self.cell(pos);
            let seq = cell.sequence.load(Ordering::Acquire);
            #[allow(clippy::cast_possible_wrap)]
            let diff = (seq as isize).wrapping_sub(pos.wrapping_add(1) as isize);

            match diff.cmp(&0) {
                Cmp::Equal => match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some((cell, pos)),
                    Err(current) => pos = current,
                },
                // Nothing published at this position yet.
                Cmp::Less => return None,
                Cmp::Greater => pos = self.dequeue_pos.load(Ordering::Relaxed),
            }
        }
    }

    /// Whether `id` is still sitting in its cell, not yet claimed.
    #[must_use]
    pub fn is_queued(&self, id: TaskId) -> bool {
        let pos = id.position();
        self.cell(pos).sequence.load(Ordering::Acquire) == pos.wrapping_add(1)
    }

    /// Request cancellation of a queued task.
    ///
    /// Returns `false` if `id` is not in the ring (never issued, already
    /// claimed, or finished).
    pub fn mark_canceled(&self, id: TaskId) -> bool {
        self.cell(id.position())
            .cancel
            .mark_while(id, || self.is_queued(id))
    }

    /// Drop every queued task, returning how many were dropped.
    ///
    /// Leaves the ring empty with both positions equal, which behaves exactly
    /// like a freshly built ring. Ids keep increasing, so ids issued before
    /// the drain never alias tasks pushed after it.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl<D> Drop for RingBuffer<D> {
    fn drop(&mut self) {
        self.drain();
    }
}
