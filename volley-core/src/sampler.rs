use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::display::{ProgressBar, ProgressDisplay, ProgressFrame};
use crate::error::Result;
use crate::executor::Executor;
use crate::pool::{BroadcastResult, Call, Reply, WorkerPool};

/// Run-wide per-scenario iteration totals built from per-worker samples.
///
/// A worker that misses a sample keeps contributing its last known counts, and every
/// scenario total is clamped to the previous one, so totals never go backwards.
#[derive(Debug, Default)]
pub(crate) struct IterationTally {
    last: Vec<BTreeMap<String, u64>>,
    totals: BTreeMap<String, u64>,
}

impl IterationTally {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            last: vec![BTreeMap::new(); workers],
            totals: BTreeMap::new(),
        }
    }

    /// Folds one `iterationsDone` broadcast in. Returns the number of workers that failed.
    pub(crate) fn record(&mut self, results: Vec<BroadcastResult<Reply>>) -> usize {
        let mut failed = 0;
        for (worker, result) in results.into_iter().enumerate() {
            match result.and_then(|reply| reply.into_iterations_done(worker)) {
                Ok(counts) => {
                    if let Some(last) = self.last.get_mut(worker) {
                        *last = counts;
                    }
                }
                Err(err) => {
                    failed += 1;
                    warn!(worker, error = %err, "iterationsDone failed; sample skips this worker");
                }
            }
        }

        let mut sums: BTreeMap<String, u64> = BTreeMap::new();
        for counts in &self.last {
            for (scenario, n) in counts {
                let sum = sums.entry(scenario.clone()).or_default();
                *sum = sum.saturating_add(*n);
            }
        }
        for (scenario, sum) in sums {
            let total = self.totals.entry(scenario).or_default();
            *total = (*total).max(sum);
        }

        failed
    }

    /// Raises totals to `counts` where `counts` is higher.
    pub(crate) fn raise_to(&mut self, counts: &BTreeMap<String, u64>) {
        for (scenario, n) in counts {
            let total = self.totals.entry(scenario.clone()).or_default();
            *total = (*total).max(*n);
        }
    }

    pub(crate) fn totals(&self) -> &BTreeMap<String, u64> {
        &self.totals
    }
}

/// Progress block for the given totals, scenarios in executor order.
pub(crate) fn build_frame<P: WorkerPool>(
    executors: &[Executor<P>],
    totals: &BTreeMap<String, u64>,
    elapsed: Duration,
) -> ProgressFrame {
    let bars: Vec<ProgressBar> = executors
        .iter()
        .map(|e| {
            let done = totals.get(e.name()).copied().unwrap_or(0);
            ProgressBar {
                scenario: e.name().to_string(),
                max_vus: e.max_vus(),
                progress: e.scenario_progress(elapsed, done),
            }
        })
        .collect();

    ProgressFrame {
        elapsed,
        current_vus: bars.iter().map(|b| b.progress.current_vus).sum(),
        max_vus: bars.iter().map(|b| b.max_vus).sum(),
        iterations: bars.iter().map(|b| b.progress.completed_iterations).sum(),
        bars,
    }
}

/// What the sampler hands back when stopped.
#[derive(Debug)]
pub(crate) struct SamplerState<W> {
    pub display: ProgressDisplay<W>,
    pub tally: IterationTally,
}

/// Periodic progress task. Owns the display until [`Sampler::stop`] returns it.
#[derive(Debug)]
pub(crate) struct Sampler<W> {
    stop: oneshot::Sender<()>,
    task: JoinHandle<SamplerState<W>>,
}

impl<W: Write + Send + 'static> Sampler<W> {
    /// Starts sampling. The first sample is taken immediately, then once per `period`.
    pub(crate) fn start<P: WorkerPool>(
        pool: Arc<P>,
        executors: Arc<[Executor<P>]>,
        mut display: ProgressDisplay<W>,
        started: Instant,
        period: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut tally = IterationTally::new(pool.size());
            let mut ticker = tokio::time::interval(period);
            // A slow broadcast delays the next sample instead of stacking them up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }

                match pool.broadcast(Call::IterationsDone).await {
                    Ok(results) => {
                        tally.record(results);
                    }
                    Err(err) => warn!(error = %err, "progress sample failed"),
                }

                let frame = build_frame(&executors, tally.totals(), started.elapsed());
                if let Err(err) = display.redraw(&frame) {
                    warn!(error = %err, "failed to draw progress");
                }
            }

            SamplerState { display, tally }
        });

        Self { stop, task }
    }

    /// Stops sampling after any in-flight sample and returns the display and totals.
    pub(crate) async fn stop(self) -> Result<SamplerState<W>> {
        let _ = self.stop.send(());
        Ok(self.task.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerError;

    fn counts(pairs: &[(&str, u64)]) -> BroadcastResult<Reply> {
        Ok(Reply::IterationsDone(
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ))
    }

    fn total(tally: &IterationTally, scenario: &str) -> u64 {
        tally.totals().get(scenario).copied().unwrap_or(0)
    }

    #[test]
    fn sums_across_workers() {
        let mut tally = IterationTally::new(2);
        let failed = tally.record(vec![
            counts(&[("a", 3), ("b", 1)]),
            counts(&[("a", 4)]),
        ]);
        assert_eq!(failed, 0);
        assert_eq!(total(&tally, "a"), 7);
        assert_eq!(total(&tally, "b"), 1);
    }

    #[test]
    fn dropped_worker_keeps_its_last_contribution() {
        let mut tally = IterationTally::new(2);
        tally.record(vec![counts(&[("a", 10)]), counts(&[("a", 5)])]);
        let failed = tally.record(vec![
            counts(&[("a", 12)]),
            Err(WorkerError::Disconnected(1)),
        ]);
        assert_eq!(failed, 1);
        assert_eq!(total(&tally, "a"), 17);
    }

    #[test]
    fn all_workers_failing_never_regresses() {
        let mut tally = IterationTally::new(2);
        tally.record(vec![counts(&[("a", 10)]), counts(&[("a", 5)])]);
        let failed = tally.record(vec![
            Err(WorkerError::Disconnected(0)),
            Err(WorkerError::Disconnected(1)),
        ]);
        assert_eq!(failed, 2);
        assert_eq!(total(&tally, "a"), 15);
    }

    #[test]
    fn unexpected_reply_counts_as_failure() {
        let mut tally = IterationTally::new(1);
        let failed = tally.record(vec![Ok(Reply::Metrics(Default::default()))]);
        assert_eq!(failed, 1);
        assert!(tally.totals().is_empty());
    }

    #[test]
    fn raise_to_only_moves_up() {
        let mut tally = IterationTally::new(1);
        tally.record(vec![counts(&[("a", 10)])]);
        tally.raise_to(&[("a".to_string(), 8), ("b".to_string(), 2)].into_iter().collect());
        assert_eq!(total(&tally, "a"), 10);
        assert_eq!(total(&tally, "b"), 2);
    }
}
