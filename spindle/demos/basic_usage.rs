//! Fan a batch of jobs out to a small pool, cancel one of them, then assist
//! from the main thread while waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spindle::prelude::*;
use spindle::ConfigError;

fn sum_range(bounds: (u64, u64, Arc<AtomicU64>), token: &CancelToken<'_>) {
    let (start, end, total) = bounds;
    let mut sum = 0;
    for n in start..end {
        if n % 1024 == 0 && token.is_canceled() {
            println!("{} canceled at {n}", token.id());
            return;
        }
        sum += n;
    }
    total.fetch_add(sum, Ordering::Relaxed);
}

fn main() -> Result<(), ConfigError> {
    let queue: TaskQueue<(u64, u64, Arc<AtomicU64>)> = TaskQueueBuilder::new()
        .buffer_size(32)
        .worker_threads(2)
        .thread_name_prefix("demo")
        .build()?;
    println!(
        "queue: {} cells, {} workers, {} bytes",
        queue.capacity(),
        queue.worker_count(),
        queue.footprint()
    );

    let total = Arc::new(AtomicU64::new(0));
    let mut ids = Vec::new();
    for chunk in 0..16 {
        let bounds = (chunk * 100_000, (chunk + 1) * 100_000, total.clone());
        match queue.enqueue(sum_range, bounds) {
            Ok(id) => ids.push(id),
            Err(full) => println!("rejected chunk starting at {}", full.into_inner().0),
        }
    }

    if let Some(&last) = ids.last() {
        println!("cancel {last}: {}", queue.cancel(last));
    }

    queue.start();
    while !ids.iter().all(|&id| queue.is_completed(id)) {
        if !queue.try_work() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    println!("total = {}", total.load(Ordering::Relaxed));
    #[cfg(feature = "metrics")]
    println!("{:?}", queue.stats());
    queue.shutdown();
    Ok(())
}
