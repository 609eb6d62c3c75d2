//! Shared workloads for the Spindle benchmarks.

use std::hint::black_box;
use std::sync::Arc;

use spindle::CancelToken;
use spindle_sync::WaitGroup;

/// Operation counts each benchmark group is run with.
pub const BATCH_SIZES: [usize; 3] = [1_000, 10_000, 100_000];

/// Burn a predictable amount of CPU.
#[inline]
pub fn spin(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, i| black_box(acc.wrapping_mul(31).wrapping_add(i)))
}

/// Task body: a little work, then signal the group.
pub fn tick(group: Arc<WaitGroup>, _: &CancelToken<'_>) {
    black_box(spin(16));
    group.done();
}

/// Task body for payload-free rings.
pub fn noop(value: u64, _: &CancelToken<'_>) {
    black_box(value);
}
