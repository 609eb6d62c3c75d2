//! Task identity, payload and cooperative cancellation.

use alloc::boxed::Box;
use core::fmt;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Function invoked by a worker for a task.
///
/// It receives the task data by value and a [`CancelToken`] that long-running
/// bodies should poll.
pub type TaskFn<D> = fn(D, &CancelToken<'_>);

/// A boxed closure task, for queues that carry heterogeneous work.
pub type Job = Box<dyn FnOnce(&CancelToken<'_>) + Send + 'static>;

/// Run a [`Job`]. Usable as the [`TaskFn`] of a `Job` queue.
pub fn run_job(job: Job, token: &CancelToken<'_>) {
    job(token);
}

/// An opaque handle to an enqueued task.
///
/// Derived from the producer position at enqueue time (its bitwise
/// complement), so the raw value `0` never names a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroUsize);

impl TaskId {
    /// Id of the task enqueued at producer position `pos`.
    ///
    /// `None` for the single position whose complement is zero; the ring
    /// never stores a task there.
    pub(crate) const fn from_position(pos: usize) -> Option<Self> {
        Self::from_raw(!pos)
    }

    /// Rebuild an id from its raw value; `0` yields `None`.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Producer position this id was issued for.
    pub(crate) const fn position(self) -> usize {
        !self.0.get()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({:#x})", self.0.get())
    }
}

/// A unit of work: a function plus the data it runs on.
pub struct Task<D> {
    func: TaskFn<D>,
    data: D,
}

impl<D> Task<D> {
    /// Create a new task.
    pub const fn new(func: TaskFn<D>, data: D) -> Self {
        Self { func, data }
    }

    /// Invoke the task function, consuming the task.
    pub fn run(self, token: &CancelToken<'_>) {
        (self.func)(self.data, token);
    }

    /// Drop the function and give the data back.
    pub fn into_data(self) -> D {
        self.data
    }
}

impl<D> fmt::Debug for Task<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Records which task, if any, has been asked to cancel.
///
/// A mark stores the raw id of the canceled task rather than a boolean, so a
/// late cancel aimed at a task that already left a cell or worker slot can
/// never be mistaken for a cancel of whatever occupies it next.
#[derive(Debug, Default)]
pub struct CancelMark(AtomicUsize);

impl CancelMark {
    /// An empty mark.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Request cancellation of `id`.
    pub fn mark(&self, id: TaskId) {
        self.0.store(id.get(), Ordering::SeqCst);
    }

    /// Whether cancellation of `id` has been requested.
    pub fn is_marked(&self, id: TaskId) -> bool {
        self.0.load(Ordering::SeqCst) == id.get()
    }

    /// Request cancellation of `id` for as long as `owns` holds.
    ///
    /// The mark is only replaced if it did not change since `owns` last
    /// returned `true`, so a late request for a task that has moved on can
    /// never overwrite a request aimed at whatever took its place.
    pub fn mark_while(&self, id: TaskId, owns: impl Fn() -> bool) -> bool {
        let mut seen = self.0.load(Ordering::SeqCst);
        loop {
            if !owns() {
                return false;
            }
            if seen == id.get() {
                return true;
            }
            match self
                .0
                .compare_exchange(seen, id.get(), Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(current) => seen = current,
            }
        }
    }

    /// Forget any request.
    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// What a running task polls to learn it was canceled.
///
/// Cancellation is advisory: nothing interrupts a task that never looks.
#[derive(Debug, Clone, Copy)]
pub struct CancelToken<'a> {
    mark: &'a CancelMark,
    id: TaskId,
}

impl<'a> CancelToken<'a> {
    /// A token observing `mark` on behalf of task `id`.
    pub const fn new(mark: &'a CancelMark, id: TaskId) -> Self {
        Self { mark, id }
    }

    /// The task this token belongs to.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Whether cancellation has been requested for this task.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.mark.is_marked(self.id)
    }
}

/// Where a task was found by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is queued but not yet started
    Queued,
    /// Task is currently running on a worker
    Running,
    /// Task is not found anywhere and is treated as finished
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}
