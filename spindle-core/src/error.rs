//! Error types for queue configuration and submission.

use core::fmt;

/// Errors reported when a [`QueueConfig`](crate::config::QueueConfig) is rejected.
///
/// Validation runs before any memory is allocated, so a rejected configuration
/// leaves nothing behind to clean up.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Ring buffer capacity below the minimum of 4 cells
    BufferTooSmall {
        /// The requested capacity
        size: usize,
    },
    /// Ring buffer capacity is not a power of two
    BufferNotPowerOfTwo {
        /// The requested capacity
        size: usize,
    },
    /// Worker count resolved to zero
    NoWorkers,
    /// The memory footprint does not fit in `isize::MAX` bytes
    LayoutOverflow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { size } => {
                write!(f, "Buffer size {size} is below the minimum of {}", crate::config::MIN_BUFFER_SIZE)
            }
            Self::BufferNotPowerOfTwo { size } => {
                write!(f, "Buffer size {size} is not a power of two")
            }
            Self::NoWorkers => write!(f, "Worker count resolved to zero"),
            Self::LayoutOverflow => write!(f, "Queue memory footprint overflows"),
        }
    }
}

/// Returned by an enqueue on a full ring buffer.
///
/// Carries the rejected task data back to the caller, who decides whether to
/// retry, drop it, or push back on its own producers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QueueFull<D>(pub D);

impl<D> QueueFull<D> {
    /// Recover the data that could not be enqueued.
    pub fn into_inner(self) -> D {
        self.0
    }
}

impl<D> fmt::Debug for QueueFull<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull").finish_non_exhaustive()
    }
}

impl<D> fmt::Display for QueueFull<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task queue is full")
    }
}

/// A result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl<D> std::error::Error for QueueFull<D> {}
