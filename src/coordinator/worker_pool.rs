//! Fixed-concurrency task pool.
//!
//! Every task is a detached tokio task that first acquires one of `size`
//! semaphore permits, so at most `size` tasks execute their body at once
//! while the rest wait in the semaphore queue. Callers never block.

use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
    active: Arc<AtomicUsize>,
    pending: Arc<AtomicUsize>,
}

struct CounterGuard(Arc<AtomicUsize>);

impl CounterGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            active: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues `task` on the pool. Returns immediately.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let active = Arc::clone(&self.active);
        let pending = CounterGuard::enter(&self.pending);

        tokio::spawn(async move {
            let permit = semaphore.acquire_owned().await;
            drop(pending);
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Worker pool closed, dropping task");
                    return;
                }
            };
            let _active = CounterGuard::enter(&active);
            task.await;
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
