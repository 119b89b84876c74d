//! Bounded queue drained by a single background task.
//!
//! Producers never wait: [`BackgroundWorker::try_submit`] either queues the
//! task or reports why it could not. The worker runs tasks one at a time in
//! submission order.
//!
//! [`BackgroundWorker::stop`] takes `&self`, so a worker shared behind an
//! `Arc` can still be drained at shutdown.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process a single task. Failures are the runnable's to log.
    async fn run(&mut self, task: Self::Task);

    /// Called once after the queue has been drained. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Why a task was not queued by [`BackgroundWorker::try_submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Full,
    #[error("worker is not running")]
    Closed,
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Mutex<Option<mpsc::Sender<R::Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker task. Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn start(mut runnable: R, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                runnable.run(task).await;
            }
            runnable.shutdown().await;
        });

        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queues a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Full`] when the queue is at capacity and
    /// [`SubmitError::Closed`] once the worker has stopped. The task is
    /// dropped in both cases.
    pub fn try_submit(&self, task: R::Task) -> Result<(), SubmitError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::Closed);
        };
        tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Closes the queue and waits until every queued task has run.
    ///
    /// Later calls return immediately. Dropping the returned future stops
    /// the wait, not the worker.
    pub async fn stop(&self) {
        self.tx.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
