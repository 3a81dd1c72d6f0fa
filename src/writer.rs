//! Async writer (component G): single-consumer job queue serializing all store mutations.
//!
//! A cloneable handle wraps the `mpsc::Sender`, and a free function owning the `Receiver` is
//! spawned as its own task. Each submission is a `FnOnce` job plus a `oneshot::Receiver` the
//! caller may await for completion, or drop to fire-and-forget — the job itself always runs in
//! submission order regardless of whether anyone waits on it.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type RunnableJob = Box<dyn FnOnce() + Send + 'static>;

/// Handle for submitting jobs to the single writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<RunnableJob>,
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle").finish_non_exhaustive()
    }
}

impl WriterHandle {
    /// Submits `job` to run on the writer task and returns a receiver for its result.
    ///
    /// Submission itself suspends if the channel is full (back-pressure). Awaiting the returned
    /// receiver is optional: the job runs whether or not anyone collects its result.
    pub async fn submit<T, F>(&self, job: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let runnable: RunnableJob = Box::new(move || {
            let _ = tx.send(job());
        });
        if self.tx.send(runnable).await.is_err() {
            debug!("writer: submission channel closed before job could run");
        }
        rx
    }

    /// Submits `job` and waits for its result. Returns `None` if the writer task is gone.
    pub async fn submit_and_wait<T, F>(&self, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit(job).await.await.ok()
    }
}

/// Spawns the writer task, returning a handle plus the task future to hand to `tokio::spawn`.
///
/// `capacity` bounds the submission channel (back-pressure); clamped to at least 1.
pub fn spawn_writer(capacity: usize) -> (WriterHandle, impl std::future::Future<Output = ()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WriterHandle { tx }, writer_task(rx))
}

/// Drains submitted jobs in order until every [`WriterHandle`] clone is dropped, at which point
/// already-queued jobs still run before the task exits.
async fn writer_task(mut rx: mpsc::Receiver<RunnableJob>) {
    while let Some(job) = rx.recv().await {
        job();
    }
    debug!("writer task exiting: submission channel closed");
}
