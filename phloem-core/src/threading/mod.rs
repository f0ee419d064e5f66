//! Threading runtime and worker management
//!
//! Uses native OS threads (std::thread); every worker starts behind a shared barrier.

use crate::Result;
use std::sync::{Arc, Barrier};
use std::thread;

pub mod worker;

pub use worker::{ConnectionOutcome, Worker, WorkerConfig};

/// Multi-threaded runtime for spawning and managing workers
pub struct ThreadingRuntime {
    num_threads: usize,
}

impl ThreadingRuntime {
    pub fn new(num_threads: usize) -> Self {
        Self { num_threads }
    }

    /// Run `worker_factory(thread_id)` on every thread and collect the results in thread order
    ///
    /// All threads start execution simultaneously after the barrier. The first worker error
    /// (or panic) is returned once every thread has been joined.
    pub fn run_workers<F, T>(&self, worker_factory: F) -> Result<Vec<T>>
    where
        F: Fn(usize) -> Result<T> + Send + Sync + Clone + 'static,
        T: Send + 'static,
    {
        let barrier = Arc::new(Barrier::new(self.num_threads));
        let mut handles = Vec::with_capacity(self.num_threads);

        for thread_id in 0..self.num_threads {
            let worker_factory = worker_factory.clone();
            let barrier = barrier.clone();

            let handle = thread::Builder::new()
                .name(format!("phloem-worker-{thread_id}"))
                .spawn(move || {
                    barrier.wait();
                    worker_factory(thread_id)
                })?;
            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            let outcome = handle
                .join()
                .map_err(|e| crate::Error::Other(format!("Thread panicked: {:?}", e)))
                .and_then(|result| result);
            match outcome {
                Ok(value) => results.push(value),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}
