//! Worker pool for background maintenance work (currently: compaction). A
//! fixed pool of threads drains a shared bounded task queue; each task
//! names its target partition itself via closure capture rather than the
//! pool knowing about partitions at all.

use crate::error::{EngineError, Result};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    job: Job,
}

pub struct WorkerPool {
    sender: Sender<Task>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver): (Sender<Task>, Receiver<Task>) = bounded(queue_capacity);
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers.max(1) {
            let receiver = receiver.clone();
            handles.push(std::thread::spawn(move || {
                for task in receiver.iter() {
                    (task.job)();
                }
            }));
        }
        Self { sender, handles }
    }

    /// Submits `job` for execution by some worker. The job itself is
    /// responsible for acquiring its target partition's write mutex before
    /// mutating it; workers are not bound to any one partition. Returns
    /// `QueueFull` if the bounded queue is saturated.
    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) -> Result<()> {
        match self.sender.try_send(Task { job: Box::new(job) }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "worker pool shut down")))
            }
        }
    }

    /// Submits `job` and blocks until it has run, returning its result. Used
    /// by background maintenance callers (compaction) that need the result
    /// of work dispatched onto the pool rather than firing and forgetting.
    pub fn submit_and_wait<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel();
        self.submit(move || {
            let result = job();
            let _ = tx.send(result);
        })?;
        rx.recv()
            .unwrap_or_else(|_| Err(EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "worker dropped result"))))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping `sender`'s final clone (held here) closes the channel;
        // workers finish draining queued tasks, then exit their `for` loop.
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
