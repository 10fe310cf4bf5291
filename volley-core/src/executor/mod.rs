use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::action::Action;
use crate::config::RunConfig;
use crate::definition::{ScenarioDefinition, ScenarioOptions};
use crate::error::{Error, Result, ScenarioError};
use crate::pool::{ActiveVus, VuJob, VuWork, WorkerPool};

mod constant_vus;
mod gate;
mod per_vu_iterations;
mod ramping_vus;
mod schedule;
mod shared_iterations;

use constant_vus::ConstantVus;
pub use gate::IterationGate;
use per_vu_iterations::PerVuIterations;
use ramping_vus::RampingVus;
pub use schedule::RampingSchedule;
use shared_iterations::SharedIterations;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(10 * 60);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::IntoStaticStr,
)]
pub enum ExecutorKind {
    #[strum(to_string = "constant-vus", serialize = "constant_vus")]
    ConstantVus,
    #[strum(to_string = "ramping-vus", serialize = "ramping_vus")]
    RampingVus,
    #[strum(to_string = "per-vu-iterations", serialize = "per_vu_iterations")]
    PerVuIterations,
    #[strum(to_string = "shared-iterations", serialize = "shared_iterations")]
    SharedIterations,
}

/// Progress of one scenario at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub elapsed: Duration,
    pub completed_iterations: u64,
    /// Always within `0.0..=100.0`.
    pub percentage: f64,
    pub current_vus: u64,
}

/// Kind-specific part of an executor.
trait Plan: Send + Sync {
    fn max_vus(&self) -> u64;

    /// Work for VU `vu` (1-based) of a scenario that started at `started`.
    fn work_for(&self, vu: u64, started: Instant) -> VuWork;

    /// Raw completion estimate; may leave `0..=100`.
    fn percentage(&self, elapsed: Duration, done: u64) -> f64;
}

/// `part / whole` as a percentage. An empty `whole` counts as done.
fn share(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 100.0;
    }
    part / whole * 100.0
}

#[derive(Debug)]
enum Shape {
    ConstantVus(ConstantVus),
    RampingVus(RampingVus),
    PerVuIterations(PerVuIterations),
    SharedIterations(SharedIterations),
}

impl Shape {
    fn plan(&self) -> &dyn Plan {
        match self {
            Self::ConstantVus(p) => p,
            Self::RampingVus(p) => p,
            Self::PerVuIterations(p) => p,
            Self::SharedIterations(p) => p,
        }
    }

    fn kind(&self) -> ExecutorKind {
        match self {
            Self::ConstantVus(_) => ExecutorKind::ConstantVus,
            Self::RampingVus(_) => ExecutorKind::RampingVus,
            Self::PerVuIterations(_) => ExecutorKind::PerVuIterations,
            Self::SharedIterations(_) => ExecutorKind::SharedIterations,
        }
    }
}

/// Drives one scenario: spreads its VUs over the pool and reports its progress.
#[derive(Debug)]
pub struct Executor<P> {
    scenario: Arc<str>,
    source: String,
    pool: Arc<P>,
    action: Arc<Action>,
    active: Arc<ActiveVus>,
    shape: Shape,
}

impl<P: WorkerPool> Executor<P> {
    /// Validates the scenario and binds it to `pool`.
    ///
    /// Run-shape overrides from `config` win over scenario values. A `ramping-vus` scenario
    /// under overrides runs as `constant-vus`.
    pub fn build(
        pool: Arc<P>,
        scenario: ScenarioDefinition,
        source: &str,
        config: &RunConfig,
    ) -> Result<Self> {
        let ScenarioDefinition {
            name,
            options,
            action,
        } = scenario;
        let shape = shape_for(&options, config).map_err(|err| Error::scenario(&name, err))?;

        Ok(Self {
            scenario: Arc::from(name),
            source: source.to_string(),
            pool,
            action: Arc::new(action),
            active: Arc::new(ActiveVus::default()),
            shape,
        })
    }

    pub fn name(&self) -> &str {
        &self.scenario
    }

    /// Where the scenario was defined (file path or label).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> ExecutorKind {
        self.shape.kind()
    }

    pub fn max_vus(&self) -> u64 {
        self.shape.plan().max_vus()
    }

    pub fn current_vus(&self) -> u64 {
        self.active.get()
    }

    /// Runs every VU of the scenario to completion.
    ///
    /// Iteration failures only show up in metrics. The first VU job the pool fails to run
    /// fails the scenario.
    pub async fn execute(&self) -> Result<()> {
        let workers = self.pool.size();
        if workers == 0 {
            return Err(Error::EmptyPool);
        }

        let plan = self.shape.plan();
        let started = Instant::now();
        let mut jobs = JoinSet::new();

        for vu in 1..=plan.max_vus() {
            let job = VuJob {
                scenario: Arc::clone(&self.scenario),
                vu,
                work: plan.work_for(vu, started),
                action: Arc::clone(&self.action),
                active: Arc::clone(&self.active),
            };
            let worker = ((vu - 1) % workers as u64) as usize;
            let pool = Arc::clone(&self.pool);
            jobs.spawn(async move { pool.run_vu(worker, job).await });
        }

        while let Some(joined) = jobs.join_next().await {
            if let Err(source) = joined? {
                jobs.abort_all();
                return Err(Error::Execution {
                    scenario: self.scenario.to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    pub fn scenario_progress(&self, elapsed: Duration, iterations_done: u64) -> ProgressSnapshot {
        let raw = self.shape.plan().percentage(elapsed, iterations_done);
        let percentage = if raw.is_finite() {
            raw.clamp(0.0, 100.0)
        } else {
            0.0
        };

        ProgressSnapshot {
            elapsed,
            completed_iterations: iterations_done,
            percentage,
            current_vus: self.current_vus(),
        }
    }
}

fn shape_for(
    options: &ScenarioOptions,
    config: &RunConfig,
) -> std::result::Result<Shape, ScenarioError> {
    let declared = options.executor.as_deref().unwrap_or("constant-vus");
    let declared: ExecutorKind = declared
        .parse()
        .map_err(|_| ScenarioError::UnknownExecutor(declared.to_string()))?;

    let converted = config.overrides_run_shape() && declared == ExecutorKind::RampingVus;
    let kind = if converted {
        ExecutorKind::ConstantVus
    } else {
        declared
    };

    if !converted && kind != ExecutorKind::RampingVus {
        if options.start_vus.is_some() {
            return Err(unsupported("startVUs", kind));
        }
        if !options.stages.is_empty() {
            return Err(unsupported("stages", kind));
        }
    }

    let vus = config.vus.or(options.vus);
    let iterations = config.iterations.or(options.iterations);

    let shape = match kind {
        ExecutorKind::ConstantVus => {
            if options.max_duration.is_some() && !converted {
                return Err(unsupported("maxDuration", kind));
            }
            let duration = config.duration.or(options.duration);
            if duration.is_some_and(|d| d.is_zero()) {
                return Err(ScenarioError::InvalidDuration("duration"));
            }
            Shape::ConstantVus(ConstantVus::new(
                positive_vus(vus.unwrap_or(1))?,
                iterations.map(positive_iterations).transpose()?,
                duration,
            ))
        }
        ExecutorKind::RampingVus => {
            if options.iterations.is_some() {
                return Err(unsupported("iterations", kind));
            }
            if options.duration.is_some() {
                return Err(unsupported("duration", kind));
            }
            let total = options
                .stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
            if options.stages.is_empty() || total.is_zero() {
                return Err(ScenarioError::InvalidStages);
            }

            let plan = RampingVus::new(options.start_vus.unwrap_or(0), options.stages.clone());
            positive_vus(plan.max_vus())?;
            Shape::RampingVus(plan)
        }
        ExecutorKind::PerVuIterations | ExecutorKind::SharedIterations => {
            if options.duration.is_some() {
                return Err(unsupported("duration", kind));
            }
            let max_duration = config
                .duration
                .or(options.max_duration)
                .unwrap_or(DEFAULT_MAX_DURATION);
            if max_duration.is_zero() {
                return Err(ScenarioError::InvalidDuration("maxDuration"));
            }

            let vus = positive_vus(vus.unwrap_or(1))?;
            let iterations = positive_iterations(iterations.unwrap_or(1))?;
            if kind == ExecutorKind::PerVuIterations {
                Shape::PerVuIterations(PerVuIterations::new(vus, iterations, max_duration))
            } else {
                Shape::SharedIterations(SharedIterations::new(vus, iterations, max_duration))
            }
        }
    };

    Ok(shape)
}

fn positive_vus(vus: u64) -> std::result::Result<u64, ScenarioError> {
    if vus == 0 {
        return Err(ScenarioError::InvalidVus);
    }
    Ok(vus)
}

fn positive_iterations(iterations: u64) -> std::result::Result<u64, ScenarioError> {
    if iterations == 0 {
        return Err(ScenarioError::InvalidIterations);
    }
    Ok(iterations)
}

fn unsupported(option: &'static str, kind: ExecutorKind) -> ScenarioError {
    ScenarioError::UnsupportedOption {
        option,
        executor: kind.into(),
    }
}
