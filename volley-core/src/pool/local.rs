use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::worker::{self, Command};
use super::{BroadcastResult, Call, Reply, VuJob, WorkerError, WorkerPool};
use crate::error::{Error, Result};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process pool of worker actors, each on its own tokio task with its own metrics.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct LocalPool {
    workers: Vec<mpsc::UnboundedSender<Command>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    call_timeout: Duration,
}

impl LocalPool {
    pub fn new(size: usize) -> Self {
        let mut workers = Vec::with_capacity(size);
        let mut tasks = Vec::with_capacity(size);
        for id in 0..size {
            let (tx, rx) = mpsc::unbounded_channel();
            workers.push(tx);
            tasks.push(tokio::spawn(worker::run(id, rx)));
        }

        Self {
            workers,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl WorkerPool for LocalPool {
    fn size(&self) -> usize {
        self.workers.len()
    }

    async fn broadcast(&self, call: Call) -> Result<Vec<BroadcastResult<Reply>>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        // Send to everyone first so workers answer concurrently.
        let pending: Vec<Option<oneshot::Receiver<Reply>>> = self
            .workers
            .iter()
            .map(|tx| {
                let (respond_to, rx) = oneshot::channel();
                tx.send(Command::Call { call, respond_to })
                    .is_ok()
                    .then_some(rx)
            })
            .collect();

        let deadline = tokio::time::Instant::now() + self.call_timeout;
        let mut out = Vec::with_capacity(pending.len());
        for (worker, rx) in pending.into_iter().enumerate() {
            let Some(rx) = rx else {
                out.push(Err(WorkerError::Disconnected(worker)));
                continue;
            };
            out.push(match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(WorkerError::Disconnected(worker)),
                Err(_) => Err(WorkerError::Timeout {
                    worker,
                    call,
                    timeout: self.call_timeout,
                }),
            });
        }
        Ok(out)
    }

    async fn run_vu(&self, worker: usize, job: VuJob) -> BroadcastResult<()> {
        let tx = self
            .workers
            .get(worker)
            .ok_or(WorkerError::NoSuchWorker(worker))?;
        if self.is_closed() {
            return Err(WorkerError::Disconnected(worker));
        }

        let (respond_to, rx) = oneshot::channel();
        tx.send(Command::RunVu { job, respond_to })
            .map_err(|_| WorkerError::Disconnected(worker))?;
        rx.await.map_err(|_| WorkerError::Disconnected(worker))?
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for tx in &self.workers {
            let _ = tx.send(Command::Shutdown);
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}
