use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use super::worker::{ScenarioMetrics, WorkerContext};
use crate::action::Action;
use crate::executor::{IterationGate, RampingSchedule};

/// Number of VUs of one scenario currently executing iterations, across all workers.
#[derive(Debug, Default)]
pub struct ActiveVus(AtomicU64);

impl ActiveVus {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Counts the caller as active until the guard is dropped.
    pub fn enter(&self) -> ActiveGuard<'_> {
        self.0.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(self)
    }
}

#[derive(Debug)]
pub struct ActiveGuard<'a>(&'a ActiveVus);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// How a VU decides whether to run its next iteration.
#[derive(Debug, Clone)]
pub enum VuWork {
    /// Run while the gate hands out iterations.
    Gate(Arc<IterationGate>),
    /// Run while `vu <= target(elapsed)`, until the schedule ends.
    Ramping {
        schedule: Arc<RampingSchedule>,
        started: Instant,
    },
}

/// One VU of one scenario, handed to a worker.
#[derive(Debug, Clone)]
pub struct VuJob {
    pub scenario: Arc<str>,
    /// 1-based index within the scenario.
    pub vu: u64,
    pub work: VuWork,
    pub action: Arc<Action>,
    pub active: Arc<ActiveVus>,
}

pub(crate) async fn run(ctx: Arc<WorkerContext>, job: VuJob) {
    let metrics = ctx.scenario_metrics(&job.scenario);

    match &job.work {
        VuWork::Gate(gate) => {
            let _active = job.active.enter();
            while gate.next() {
                iterate(&ctx, &job, &metrics).await;
            }
        }
        VuWork::Ramping { schedule, started } => {
            let mut active = None;
            loop {
                let elapsed = started.elapsed();
                if schedule.is_done(elapsed) {
                    break;
                }

                if job.vu <= schedule.target_at(elapsed) {
                    if active.is_none() {
                        active = Some(job.active.enter());
                    }
                    iterate(&ctx, &job, &metrics).await;
                } else {
                    active = None;
                    let wait = schedule
                        .next_recheck_in(elapsed, job.vu)
                        .max(Duration::from_millis(1));
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

async fn iterate(ctx: &WorkerContext, job: &VuJob, metrics: &ScenarioMetrics) {
    let started = Instant::now();
    let result = job.action.run(ctx, &job.scenario, metrics).await;

    metrics.iteration_duration.observe(micros(started.elapsed()));
    metrics.iterations.increment(1);

    if let Err(err) = result {
        metrics.iteration_errors.increment(1);
        debug!(
            scenario = %job.scenario,
            vu = job.vu,
            worker = ctx.id,
            error = %err,
            "iteration failed"
        );
    }
}

pub(crate) fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX).max(1)
}
