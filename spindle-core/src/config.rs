//! Queue configuration and memory footprint computation.

use alloc::string::String;
use core::alloc::Layout;

use crate::error::{ConfigError, ConfigResult};

/// Smallest accepted ring buffer capacity.
pub const MIN_BUFFER_SIZE: usize = 4;

/// Ring buffer capacity used by [`QueueConfig::default`].
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Configuration for a task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Ring buffer capacity; a power of two, at least [`MIN_BUFFER_SIZE`]
    pub buffer_size: usize,
    /// Worker thread count; `0` means one per logical core
    pub num_workers: usize,
    /// Thread name prefix for worker threads
    pub thread_name_prefix: String,
    /// Stack size for worker threads (bytes), platform default when `None`
    pub stack_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            num_workers: 0,
            thread_name_prefix: "spindle-worker".into(),
            stack_size: None,
        }
    }
}

impl QueueConfig {
    /// A configuration with the given capacity and worker count.
    #[must_use]
    pub fn new(buffer_size: usize, num_workers: usize) -> Self {
        Self {
            buffer_size,
            num_workers,
            ..Self::default()
        }
    }

    /// Worker count after applying the "0 means one per core" default.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.num_workers == 0 {
            spindle_utils::logical_cpus()
        } else {
            self.num_workers
        }
    }

    /// Check the capacity and worker count.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the capacity is below the minimum or not a
    /// power of two, or if the worker count resolves to zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::BufferTooSmall { size: self.buffer_size });
        }
        if !self.buffer_size.is_power_of_two() {
            return Err(ConfigError::BufferNotPowerOfTwo { size: self.buffer_size });
        }
        if self.resolved_workers() == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Validate and lay out a queue built from the given parts.
    ///
    /// # Errors
    ///
    /// Everything [`validate`](Self::validate) rejects, plus
    /// [`ConfigError::LayoutOverflow`] when the footprint cannot be represented.
    pub fn layout(&self, parts: LayoutParts) -> ConfigResult<QueueLayout> {
        self.validate()?;
        QueueLayout::compute(self.buffer_size, self.resolved_workers(), parts)
    }
}

/// Per-element layouts of the blocks that make up a queue.
#[derive(Debug, Clone, Copy)]
pub struct LayoutParts {
    /// The queue header (positions, stop flag, semaphore)
    pub header: Layout,
    /// One ring buffer cell
    pub cell: Layout,
    /// One thread handle
    pub handle: Layout,
    /// One worker slot
    pub slot: Layout,
}

/// Offset table and total size of a queue.
///
/// The blocks are laid out header, cells, thread handles, worker slots, each
/// aligned for its element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLayout {
    /// Resolved ring buffer capacity
    pub buffer_size: usize,
    /// Resolved worker count
    pub num_workers: usize,
    /// Offset of the cell array
    pub cells_offset: usize,
    /// Offset of the thread handle array
    pub handles_offset: usize,
    /// Offset of the worker slot array
    pub slots_offset: usize,
    /// Total bytes, padded to the strictest alignment
    pub footprint: usize,
    /// Strictest alignment of any block
    pub align: usize,
}

impl QueueLayout {
    fn compute(buffer_size: usize, num_workers: usize, parts: LayoutParts) -> ConfigResult<Self> {
        let overflow = |_| ConfigError::LayoutOverflow;

        let cells = Layout::from_size_align(
            parts.cell.size().checked_mul(buffer_size).ok_or(ConfigError::LayoutOverflow)?,
            parts.cell.align(),
        )
        .map_err(overflow)?;
        let handles = Layout::from_size_align(
            parts.handle.size().checked_mul(num_workers).ok_or(ConfigError::LayoutOverflow)?,
            parts.handle.align(),
        )
        .map_err(overflow)?;
        let slots = Layout::from_size_align(
            parts.slot.size().checked_mul(num_workers).ok_or(ConfigError::LayoutOverflow)?,
            parts.slot.align(),
        )
        .map_err(overflow)?;

        let (block, cells_offset) = parts.header.extend(cells).map_err(overflow)?;
        let (block, handles_offset) = block.extend(handles).map_err(overflow)?;
        let (block, slots_offset) = block.extend(slots).map_err(overflow)?;
        let block = block.pad_to_align();

        Ok(Self {
            buffer_size,
            num_workers,
            cells_offset,
            handles_offset,
            slots_offset,
            footprint: block.size(),
            align: block.align(),
        })
    }
}
