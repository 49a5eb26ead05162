//! Persistent worker pool behind the parallel step phases.
//!
//! Workers are spawned once with the world and torn down with it. A phase
//! broadcasts one job closure to every worker; the main thread then
//! spin-waits in 100 µs sleeps until the outstanding count drains. Work
//! never crosses a `step` boundary, so a job may safely borrow world
//! storage for its duration.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::{MAX_WORKER_THREADS, SPIN_WAIT_MICROS};

type Job = Arc<dyn Fn(usize) + Send + Sync + 'static>;

struct PoolShared {
    /// Current job tagged with its dispatch epoch; workers run each epoch
    /// exactly once.
    job: Mutex<Option<(u64, Job)>>,
    signal: Condvar,
    outstanding: AtomicUsize,
    shutdown: AtomicBool,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
    epoch: u64,
}

impl WorkerPool {
    /// Worker count matched to the host, capped to keep oversubscription in
    /// check.
    pub fn default_thread_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_WORKER_THREADS)
    }

    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(PoolShared {
            job: Mutex::new(None),
            signal: Condvar::new(),
            outstanding: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let threads = (0..thread_count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("physics-worker-{id}"))
                    .spawn(move || worker_loop(id, shared))
                    .expect("failed to spawn physics worker")
            })
            .collect();

        Self {
            shared,
            threads,
            epoch: 0,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Broadcasts `job` to every worker and blocks until all of them have
    /// finished it. With zero workers the job runs inline.
    ///
    /// The closure may borrow non-'static state: this method does not
    /// return until the outstanding count reaches zero and the job slot is
    /// cleared, so no worker can observe the borrow after it ends.
    pub fn run<'scope, F>(&mut self, job: F)
    where
        F: Fn(usize) + Send + Sync + 'scope,
    {
        let workers = self.threads.len();
        if workers == 0 {
            job(0);
            return;
        }

        self.epoch += 1;
        self.shared.outstanding.store(workers, Ordering::Release);

        let job: Arc<dyn Fn(usize) + Send + Sync + 'scope> = Arc::new(job);
        // Erase the lifetime; the join below outlives every worker's use.
        let job: Job = unsafe {
            std::mem::transmute::<Arc<dyn Fn(usize) + Send + Sync + 'scope>, Job>(job)
        };

        {
            let mut slot = self.shared.job.lock();
            *slot = Some((self.epoch, job));
        }
        self.shared.signal.notify_all();

        while self.shared.outstanding.load(Ordering::Acquire) > 0 {
            thread::sleep(Duration::from_micros(SPIN_WAIT_MICROS));
        }

        // Drop the erased closure before returning to the borrowed scope.
        *self.shared.job.lock() = None;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: usize, shared: Arc<PoolShared>) {
    let mut last_epoch = 0u64;
    loop {
        let job = {
            let mut slot = shared.job.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                match slot.as_ref() {
                    Some((epoch, job)) if *epoch != last_epoch => {
                        last_epoch = *epoch;
                        break Arc::clone(job);
                    }
                    _ => shared.signal.wait(&mut slot),
                }
            }
        };

        job(id);
        shared.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Work-stealing index dispenser: a shared atomic cursor hands out
/// fixed-size batches until the range is exhausted.
pub struct BatchQueue {
    cursor: AtomicUsize,
    len: usize,
    batch: usize,
}

impl BatchQueue {
    pub fn new(len: usize, batch: usize) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            len,
            batch: batch.max(1),
        }
    }

    /// Claims the next batch, or `None` when the work is gone.
    pub fn next_batch(&self) -> Option<Range<usize>> {
        let start = self.cursor.fetch_add(self.batch, Ordering::Relaxed);
        if start >= self.len {
            return None;
        }
        Some(start..(start + self.batch).min(self.len))
    }
}
