//! Integration tests for the Spindle task queue.


/// End-to-end tests driving a [`spindle::TaskQueue`] from several threads.
#[cfg(test)]
mod integration_tests {
    use spindle::prelude::*;
    use spindle::{TaskFn, WaitGroup};
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(20);

    fn queue<D: Send + 'static>(buffer_size: usize, workers: usize) -> TaskQueue<D> {
        TaskQueueBuilder::new()
            .buffer_size(buffer_size)
            .worker_threads(workers)
            .build()
            .expect("valid test configuration")
    }

    fn wait_for(queue: &TaskQueue<impl Send + 'static>, ids: &[TaskId]) {
        let deadline = Instant::now() + TIMEOUT;
        while !ids.iter().all(|&id| queue.is_completed(id)) {
            assert!(Instant::now() < deadline, "tasks did not complete in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Enqueue, helping out with `try_work` while the ring is full.
    fn enqueue_retrying<D: Send + 'static>(
        queue: &TaskQueue<D>,
        func: TaskFn<D>,
        mut data: D,
    ) -> TaskId {
        loop {
            match queue.enqueue(func, data) {
                Ok(id) => return id,
                Err(full) => {
                    data = full.into_inner();
                    if !queue.try_work() {
                        thread::yield_now();
                    }
                }
            }
        }
    }

    fn bump(counter: Arc<AtomicUsize>, _: &CancelToken<'_>) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_every_task_runs_exactly_once() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        fn record(hit: (Arc<Vec<AtomicU8>>, usize), _: &CancelToken<'_>) {
            let (seen, index) = hit;
            seen[index].fetch_add(1, Ordering::Relaxed);
        }

        let queue = Arc::new(queue(256, 4));
        let seen: Arc<Vec<AtomicU8>> =
            Arc::new((0..PRODUCERS * PER_PRODUCER).map(|_| AtomicU8::new(0)).collect());
        assert!(queue.start());

        let barrier = Arc::new(Barrier::new(PRODUCERS));
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                let seen = Arc::clone(&seen);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_PRODUCER)
                        .map(|i| {
                            let hit = (Arc::clone(&seen), p * PER_PRODUCER + i);
                            enqueue_retrying(&queue, record, hit)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for producer in producers {
            ids.extend(producer.join().unwrap());
        }

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len(), "task ids must be unique");

        wait_for(&queue, &ids);
        assert!(seen.iter().all(|count| count.load(Ordering::Relaxed) == 1));
        assert!(queue.stop(true));
    }

    #[test]
    fn test_concurrent_counter() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;

        let queue = Arc::new(queue(64, 3));
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(queue.start());

        let producers: Vec<_> = (0..THREADS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        enqueue_retrying(&queue, bump, Arc::clone(&counter));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let total = (THREADS * PER_THREAD) as u64;
        let deadline = Instant::now() + TIMEOUT;
        while queue.stats().completed() < total {
            assert!(Instant::now() < deadline, "workers stalled");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(counter.load(Ordering::Relaxed), THREADS * PER_THREAD);

        let stats = queue.stats();
        assert_eq!(stats.enqueued, total);
        assert_eq!(stats.completed(), total);
        assert_eq!(stats.panicked, 0);
    }

    #[test]
    fn test_enqueue_then_assist_without_workers() {
        const THREADS: usize = 6;
        const PER_THREAD: usize = 3_000;

        let queue = Arc::new(queue::<Arc<AtomicUsize>>(16, 1));
        let counter = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..THREADS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        enqueue_retrying(&queue, bump, Arc::clone(&counter));
                        queue.try_work();
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }
        while queue.try_work() {}

        assert_eq!(counter.load(Ordering::Relaxed), THREADS * PER_THREAD);
        assert_eq!(queue.stats().assisted, (THREADS * PER_THREAD) as u64);
    }

    #[test]
    fn test_capacity_of_four() {
        let queue = queue::<Arc<AtomicUsize>>(4, 1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            assert!(queue.enqueue(bump, Arc::clone(&counter)).is_ok());
        }
        assert_eq!(queue.len(), 4);
        assert!(queue.enqueue(bump, Arc::clone(&counter)).is_err());

        assert!(queue.start());
        let deadline = Instant::now() + TIMEOUT;
        while counter.load(Ordering::Relaxed) < 4 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(queue.enqueue(bump, Arc::clone(&counter)).is_ok());
    }

    #[test]
    fn test_single_worker_fifo() {
        fn push(entry: (Arc<Mutex<Vec<u32>>>, u32), _: &CancelToken<'_>) {
            entry.0.lock().unwrap().push(entry.1);
        }

        let queue = queue(512, 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        assert!(queue.start());

        let ids: Vec<_> = (0..300)
            .map(|i| enqueue_retrying(&queue, push, (Arc::clone(&order), i)))
            .collect();
        wait_for(&queue, &ids);

        assert_eq!(*order.lock().unwrap(), (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_before_start() {
        let queue = queue::<Job>(8, 2);
        let (tx, rx) = mpsc::channel();

        let ids: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                queue
                    .spawn(move |token| tx.send((i, token.is_canceled())).unwrap())
                    .unwrap()
            })
            .collect();
        assert!(queue.cancel(ids[1]));
        assert!(queue.cancel(ids[3]));

        assert!(queue.start());
        let mut observed: Vec<_> = (0..4).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        observed.sort_unstable();
        assert_eq!(observed, vec![(0, false), (1, true), (2, false), (3, true)]);

        wait_for(&queue, &ids);
        assert!(!queue.cancel(ids[0]), "completed tasks cannot be canceled");
    }

    #[test]
    fn test_cancel_long_running_task() {
        let queue = queue::<Job>(8, 1);
        let started = Arc::new(WaitGroup::new());
        started.add(1);
        let stopped_early = Arc::new(AtomicBool::new(false));
        assert!(queue.start());

        let id = {
            let started = Arc::clone(&started);
            let stopped_early = Arc::clone(&stopped_early);
            queue
                .spawn(move |token| {
                    started.done();
                    let deadline = Instant::now() + TIMEOUT;
                    while Instant::now() < deadline {
                        if token.is_canceled() {
                            stopped_early.store(true, Ordering::SeqCst);
                            return;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                })
                .unwrap()
        };

        assert!(started.wait_timeout(TIMEOUT));
        assert!(!queue.is_completed(id));
        assert!(queue.cancel(id));
        wait_for(&queue, &[id]);
        assert!(stopped_early.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_unknown_id_is_false() {
        let queue = queue::<Job>(8, 1);
        let id = queue.spawn(|_| {}).unwrap();
        assert!(queue.try_work());

        assert!(!queue.cancel(id));
        assert!(!queue.cancel(TaskId::from_raw(0xdead_beef).unwrap()));
    }

    #[test]
    fn test_completion_through_try_work_only() {
        let queue = queue::<Job>(16, 1);
        let ran = Arc::new(AtomicUsize::new(0));

        let ids: Vec<_> = (0..5)
            .map(|_| {
                let ran = Arc::clone(&ran);
                queue
                    .spawn(move |_| {
                        ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap()
            })
            .collect();
        assert!(ids.iter().all(|&id| !queue.is_completed(id)));

        while queue.try_work() {}
        assert_eq!(ran.load(Ordering::SeqCst), 5);
        assert!(ids.iter().all(|&id| queue.is_completed(id)));
    }

    #[test]
    fn test_stop_without_flush_keeps_pending_tasks() {
        let queue = Arc::new(queue::<Job>(16, 1));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started = Arc::new(WaitGroup::new());
        started.add(1);
        let ran = Arc::new(AtomicUsize::new(0));
        assert!(queue.start());

        {
            let started = Arc::clone(&started);
            queue
                .spawn(move |_| {
                    started.done();
                    release_rx.recv_timeout(TIMEOUT).unwrap();
                })
                .unwrap();
        }
        assert!(started.wait_timeout(TIMEOUT));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            queue
                .spawn(move |_| {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();
        });
        assert!(queue.stop(false));
        releaser.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 3);

        assert!(queue.start());
        let deadline = Instant::now() + TIMEOUT;
        while ran.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_restart_after_flush_behaves_like_fresh() {
        let queue = queue::<Arc<AtomicUsize>>(4, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            assert!(queue.start());
            let ids: Vec<_> = (0..4)
                .map(|_| queue.enqueue(bump, Arc::clone(&counter)).unwrap())
                .collect();
            wait_for(&queue, &ids);
            assert!(queue.stop(true));
            assert!(!queue.is_running());
            assert!(queue.is_empty());
        }
        assert_eq!(counter.load(Ordering::Relaxed), 12);

        // Whatever the flush catches is dropped, not run.
        for _ in 0..4 {
            queue.enqueue(bump, Arc::clone(&counter)).unwrap();
        }
        assert!(queue.start());
        assert!(queue.stop(true));
        assert!(queue.is_empty());
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_panics_are_contained() {
        fn maybe_panic(n: u32, _: &CancelToken<'_>) {
            assert!(n % 3 != 0, "multiple of three: {n}");
        }

        let queue = queue::<u32>(64, 2);
        assert!(queue.start());
        let ids: Vec<_> = (0..30).map(|n| queue.enqueue(maybe_panic, n).unwrap()).collect();
        wait_for(&queue, &ids);

        let stats = queue.stats();
        assert_eq!(stats.panicked, 10);
        assert_eq!(stats.completed(), 30);
        assert!(queue.is_running());
    }

    #[test]
    fn test_drop_discards_pending_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = queue::<Arc<AtomicUsize>>(8, 1);
            for _ in 0..8 {
                queue.enqueue(bump, Arc::clone(&counter)).unwrap();
            }
        }
        assert_eq!(Arc::strong_count(&counter), 1);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
