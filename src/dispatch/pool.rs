//! Fixed-size worker pool for off-thread callbacks.

use crate::error::{PollError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use super::{panic_message, Executor, Job};

/// A pool of named threads draining a shared job queue.
///
/// Jobs run in submission order per worker, but with more than one thread
/// there is no ordering across jobs. Use a single-thread pool to serialize
/// callbacks of several listeners.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one).
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self> {
        let name = name.into();
        let threads = threads.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = receiver.clone();
            let thread_name = format!("{}-{}", name, i);
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(thread_name, rx))?;
            workers.push(handle);
        }

        debug!(pool = %name, threads, "Worker pool started");
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            threads,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Stop accepting jobs, let queued ones finish, and join the workers.
    ///
    /// Idempotent. When called from one of the pool's own workers, that
    /// worker is not joined.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| PollError::ExecutorUnavailable(self.name.clone())),
            None => Err(PollError::ExecutorUnavailable(format!("{} is shut down", self.name))),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(name: String, rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(worker = %name, "Job panicked: {}", panic_message(payload.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_jobs() {
        let pool = WorkerPool::new("test-pool", 2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let count = Arc::clone(&count);
            pool.execute(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = WorkerPool::new("test-pool", 1).unwrap();
        pool.shutdown();
        pool.shutdown();

        let result = pool.execute(Box::new(|| {}));
        assert!(matches!(result, Err(PollError::ExecutorUnavailable(_))));
    }

    #[test]
    fn test_survives_panicking_job() {
        let pool = WorkerPool::new("test-pool", 1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        pool.execute(Box::new(|| panic!("job failure"))).unwrap();
        let c = Arc::clone(&count);
        pool.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(pool.threads(), 1);
    }
}
