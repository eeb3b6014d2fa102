//! Deferred work facility.
//!
//! Memory that must not be released on the caller's execution context is
//! handed to a [`DeferredWork`] implementation as a boxed job. The
//! [`AsyncWorkQueue`] runs jobs in submission order on one background thread
//! fed by a `crossbeam-channel` queue.

use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

use crate::config::ReclaimerConfig;
use crate::error::{Error, Result};

/// Unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Accepts jobs to run later, off the caller's execution context.
pub trait DeferredWork {
    /// Queues `job`.
    ///
    /// # Errors
    ///
    /// Hands `job` back unrun if the facility no longer accepts work.
    fn add_work(&self, job: Job) -> std::result::Result<(), Job>;
}

/// Background worker thread draining a job queue.
pub struct AsyncWorkQueue {
    tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
}

impl AsyncWorkQueue {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured thread name is unusable,
    /// or [`Error::WorkQueue`] if the thread cannot be spawned.
    pub fn new(config: &ReclaimerConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = unbounded::<Job>();
        let completed = Arc::new(AtomicU64::new(0));

        let worker_completed = Arc::clone(&completed);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_loop(&rx, &worker_completed))
            .map_err(|e| Error::WorkQueue(format!("failed to spawn reclaim worker: {e}")))?;

        debug!(thread = %config.thread_name, "reclaim worker started");
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            completed,
        })
    }

    /// Number of jobs that have finished running (including ones that panicked).
    #[must_use]
    pub fn completed_jobs(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Number of jobs queued but not yet started.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.tx.lock().as_ref().map_or(0, Sender::len)
    }

    /// Stops accepting work, runs every queued job, then joins the worker.
    pub fn shutdown(&self) {
        // Dropping the last sender ends the worker loop once the queue is drained.
        drop(self.tx.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("reclaim worker terminated abnormally");
            }
        }
    }
}

impl DeferredWork for AsyncWorkQueue {
    fn add_work(&self, job: Job) -> std::result::Result<(), Job> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|SendError(job)| job),
            None => Err(job),
        }
    }
}

impl Drop for AsyncWorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWorkQueue")
            .field("pending", &self.pending_jobs())
            .field("completed", &self.completed_jobs())
            .finish_non_exhaustive()
    }
}

fn worker_loop(rx: &Receiver<Job>, completed: &AtomicU64) {
    while let Ok(job) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("deferred job panicked");
        }
        completed.fetch_add(1, Ordering::AcqRel);
    }
}
