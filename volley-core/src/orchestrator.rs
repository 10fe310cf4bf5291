use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};
use volley_metrics::MetricsSnapshot;

use crate::config::{ReportFormat, RunConfig};
use crate::definition::DefinitionSource;
use crate::display::ProgressDisplay;
use crate::error::{Error, Result};
use crate::executor::{Executor, ProgressSnapshot};
use crate::pool::worker::ITERATIONS;
use crate::pool::{Call, WorkerPool};
use crate::report::{self, ReportContext};
use crate::sampler::{Sampler, SamplerState, build_frame};

/// Final state of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Merge of every metrics snapshot the workers returned.
    pub metrics: MetricsSnapshot,
    /// Declaration order.
    pub scenarios: Vec<ScenarioOutcome>,
    pub elapsed: Duration,
    pub workers: usize,
    pub failed_workers: usize,
}

/// Runs one test definition on a worker pool and renders progress and the report to `out`.
#[derive(Debug)]
pub struct Orchestrator<P, W> {
    pool: Arc<P>,
    out: W,
    config: RunConfig,
}

impl<P, W> Orchestrator<P, W>
where
    P: WorkerPool,
    W: Write + Send + 'static,
{
    pub fn new(pool: Arc<P>, out: W, config: RunConfig) -> Self {
        Self { pool, out, config }
    }

    /// Loads the definition, runs every scenario to completion and reports.
    ///
    /// The pool is shut down before this returns, whatever the outcome. A failed scenario
    /// fails the run and suppresses the report.
    pub async fn run(self, source: &impl DefinitionSource) -> Result<RunOutcome> {
        let pool = Arc::clone(&self.pool);
        let label = source.label();

        let result = self.run_inner(source, &label).await;
        pool.shutdown().await;

        if let Err(err) = &result {
            error!(source = %label, phase = %err.phase(), error = %err, "run failed");
        }
        result
    }

    async fn run_inner(self, source: &impl DefinitionSource, label: &str) -> Result<RunOutcome> {
        let Self { pool, out, config } = self;

        let definition = source.load()?.ok_or(Error::MissingOptions)?;
        info!(
            source = %label,
            scenarios = definition.scenarios.len(),
            workers = pool.size(),
            "starting run"
        );

        let executors: Arc<[Executor<P>]> = definition
            .scenarios
            .into_iter()
            .map(|scenario| Executor::build(Arc::clone(&pool), scenario, label, &config))
            .collect::<Result<Vec<_>>>()?
            .into();

        let started = Instant::now();
        let sampler = Sampler::start(
            Arc::clone(&pool),
            Arc::clone(&executors),
            ProgressDisplay::new(out, config.progress),
            started,
            config.sample_interval,
        );

        let mut running = JoinSet::new();
        for idx in 0..executors.len() {
            let executors = Arc::clone(&executors);
            running.spawn(async move { executors[idx].execute().await });
        }

        let mut failure = None;
        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined.map_err(Error::from).and_then(|r| r) {
                failure = Some(err);
                break;
            }
        }

        if let Some(err) = failure {
            // The other executors keep going until the pool shuts down under them.
            running.detach_all();
            let SamplerState { mut display, .. } = sampler.stop().await?;
            display.clear()?;
            return Err(err);
        }

        let elapsed = started.elapsed();
        let SamplerState {
            mut display,
            mut tally,
        } = sampler.stop().await?;
        display.clear()?;

        let results = pool.broadcast(Call::Metrics).await?;
        let workers = results.len();
        let mut snapshots = Vec::with_capacity(workers);
        for (worker, result) in results.into_iter().enumerate() {
            match result.and_then(|reply| reply.into_metrics(worker)) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => warn!(worker, error = %err, "worker returned no metrics"),
            }
        }
        let failed_workers = workers - snapshots.len();
        if failed_workers > 0 {
            warn!(
                failed = failed_workers,
                workers, "metrics missing from some workers; result may be inaccurate"
            );
        }
        let metrics = MetricsSnapshot::merge_all(snapshots);

        let names: Vec<String> = executors.iter().map(|e| e.name().to_string()).collect();
        let ctx = ReportContext {
            elapsed,
            workers,
            failed_workers,
        };
        let rendered = match config.report {
            ReportFormat::Human => report::render_human(&metrics, &names, &ctx),
            ReportFormat::Json => report::render_json(&metrics, &names, &ctx)?,
        };
        display.write_report(&rendered)?;

        tally.raise_to(&metrics.counter_by_tag(ITERATIONS, "scenario"));
        let frame = build_frame(&executors, tally.totals(), elapsed);
        // JSON output stays machine-readable.
        if config.report == ReportFormat::Human {
            display.print_final(&frame)?;
        }

        Ok(RunOutcome {
            metrics,
            scenarios: frame
                .bars
                .into_iter()
                .map(|b| ScenarioOutcome {
                    name: b.scenario,
                    progress: b.progress,
                })
                .collect(),
            elapsed,
            workers,
            failed_workers,
        })
    }
}
