#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use volley_core::pool::{BroadcastResult, Call, LocalPool, Reply, VuJob, WorkerError, WorkerPool};

/// Cloneable in-memory writer, so tests can read what a run printed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// [`LocalPool`] with injectable failures.
#[derive(Debug)]
pub struct FlakyPool {
    inner: LocalPool,
    /// Workers `0..n` fail the `metrics` call.
    pub failing_metrics: usize,
    /// Workers `0..n` fail the `iterations_done` call.
    pub failing_iterations_done: usize,
    /// Every worker fails odd-numbered `iterations_done` calls.
    pub flapping_iterations_done: bool,
    /// VU jobs of this scenario fail after the delay.
    pub failing_scenario: Option<(&'static str, Duration)>,
    pub broadcasts: AtomicUsize,
    pub vu_jobs: AtomicUsize,
    iterations_done_calls: AtomicUsize,
}

impl FlakyPool {
    pub fn new(workers: usize) -> Self {
        Self {
            inner: LocalPool::new(workers),
            failing_metrics: 0,
            failing_iterations_done: 0,
            flapping_iterations_done: false,
            failing_scenario: None,
            broadcasts: AtomicUsize::new(0),
            vu_jobs: AtomicUsize::new(0),
            iterations_done_calls: AtomicUsize::new(0),
        }
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn vu_jobs(&self) -> usize {
        self.vu_jobs.load(Ordering::SeqCst)
    }
}

impl WorkerPool for FlakyPool {
    fn size(&self) -> usize {
        self.inner.size()
    }

    async fn broadcast(&self, call: Call) -> volley_core::Result<Vec<BroadcastResult<Reply>>> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        let mut results = self.inner.broadcast(call).await?;
        let failing = match call {
            Call::Metrics => self.failing_metrics,
            Call::IterationsDone => {
                let n = self.iterations_done_calls.fetch_add(1, Ordering::SeqCst);
                if self.flapping_iterations_done && n % 2 == 1 {
                    results.len()
                } else {
                    self.failing_iterations_done
                }
            }
        };
        for (worker, result) in results.iter_mut().enumerate().take(failing) {
            *result = Err(WorkerError::Failed {
                worker,
                reason: "injected".to_string(),
            });
        }
        Ok(results)
    }

    async fn run_vu(&self, worker: usize, job: VuJob) -> BroadcastResult<()> {
        self.vu_jobs.fetch_add(1, Ordering::SeqCst);
        if let Some((scenario, after)) = self.failing_scenario
            && &*job.scenario == scenario
        {
            tokio::time::sleep(after).await;
            return Err(WorkerError::Failed {
                worker,
                reason: "injected".to_string(),
            });
        }
        self.inner.run_vu(worker, job).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

/// `N` in every `running (...), a/b VUs, N complete iterations` header, in print order.
pub fn header_iterations(output: &str) -> Vec<u64> {
    output
        .split("running (")
        .skip(1)
        .filter_map(|frame| {
            let header = frame.lines().next()?;
            let (_, tail) = header.rsplit_once(", ")?;
            tail.strip_suffix(" complete iterations")?.parse().ok()
        })
        .collect()
}
