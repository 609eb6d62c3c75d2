//! Utility functions and data structures for the Spindle task queue.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

/// Cache line size for alignment optimizations.
pub const CACHE_LINE_SIZE: usize = 64;

/// A cache-aligned wrapper for data structures.
///
/// Hot atomics that are written by different threads (the enqueue and dequeue
/// positions, per-worker slots) are wrapped in this type so that each lives on
/// its own cache line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

const _: () = assert!(core::mem::align_of::<CacheAligned<u8>>() == CACHE_LINE_SIZE);

impl<T> CacheAligned<T> {
    /// Create a new cache-aligned value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> core::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Number of logical processors available to this process.
///
/// Falls back to 1 when the platform cannot report it.
#[cfg(feature = "std")]
#[must_use]
pub fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(core::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Number of logical processors available to this process.
#[cfg(not(feature = "std"))]
#[must_use]
pub fn logical_cpus() -> usize {
    1
}
