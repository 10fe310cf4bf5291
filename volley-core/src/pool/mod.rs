//! Worker pool seam.
//!
//! The orchestrator only ever talks to workers through [`WorkerPool`]: it broadcasts
//! [`Call`]s to every worker at once and hands VU loops to individual workers. A broadcast
//! always yields one outcome per worker so that a single unhealthy worker never takes a
//! whole sample (or the final report) down with it.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use volley_metrics::MetricsSnapshot;

mod local;
pub(crate) mod vu;
pub(crate) mod worker;

pub use local::LocalPool;
pub use vu::{ActiveGuard, ActiveVus, VuJob, VuWork};

/// Request sent to every worker in a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Call {
    /// Per-scenario iteration counts completed so far on the worker.
    #[strum(serialize = "iterationsDone")]
    IterationsDone,
    /// Full metrics snapshot of the worker.
    #[strum(serialize = "metrics")]
    Metrics,
}

#[derive(Debug, Clone)]
pub enum Reply {
    IterationsDone(BTreeMap<String, u64>),
    Metrics(MetricsSnapshot),
}

impl Reply {
    pub fn into_iterations_done(self, worker: usize) -> BroadcastResult<BTreeMap<String, u64>> {
        match self {
            Self::IterationsDone(counts) => Ok(counts),
            Self::Metrics(_) => Err(WorkerError::UnexpectedReply {
                worker,
                call: Call::IterationsDone,
            }),
        }
    }

    pub fn into_metrics(self, worker: usize) -> BroadcastResult<MetricsSnapshot> {
        match self {
            Self::Metrics(snapshot) => Ok(snapshot),
            Self::IterationsDone(_) => Err(WorkerError::UnexpectedReply {
                worker,
                call: Call::Metrics,
            }),
        }
    }
}

/// Outcome of one worker's part in a broadcast, or of one VU job.
pub type BroadcastResult<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {0} is not running")]
    Disconnected(usize),

    #[error("worker {worker} did not answer `{call}` within {timeout:?}")]
    Timeout {
        worker: usize,
        call: Call,
        timeout: Duration,
    },

    #[error("worker {worker} failed: {reason}")]
    Failed { worker: usize, reason: String },

    #[error("worker {worker} sent an unexpected reply to `{call}`")]
    UnexpectedReply { worker: usize, call: Call },

    #[error("no worker with index {0}")]
    NoSuchWorker(usize),
}

/// A fixed set of workers, indexed `0..size()`.
pub trait WorkerPool: Send + Sync + 'static {
    fn size(&self) -> usize;

    /// Sends `call` to every worker and collects one outcome per worker, in worker order.
    ///
    /// Only a pool that can no longer broadcast at all (e.g. after shutdown) is an `Err`.
    fn broadcast(
        &self,
        call: Call,
    ) -> impl Future<Output = crate::Result<Vec<BroadcastResult<Reply>>>> + Send;

    /// Runs one VU loop on `worker`, resolving when the loop ends.
    fn run_vu(&self, worker: usize, job: VuJob)
    -> impl Future<Output = BroadcastResult<()>> + Send;

    /// Stops every worker. Calling it again is a no-op.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}
