mod action;
mod config;
mod definition;
mod display;
mod error;
mod executor;
mod http_client;
mod orchestrator;
pub mod pool;
mod report;
mod sampler;

pub use action::{Action, HttpAction};
pub use config::{ProgressMode, ReportFormat, RunConfig};
pub use definition::{
    DefinitionSource, ScenarioDefinition, ScenarioOptions, Stage, TestDefinition, YamlFile,
    YamlStr,
};
pub use display::{ProgressBar, ProgressDisplay, ProgressFrame, format_elapsed};
pub use error::{Error, Phase, Result, ScenarioError};
pub use executor::{Executor, ExecutorKind, IterationGate, ProgressSnapshot, RampingSchedule};
pub use orchestrator::{Orchestrator, RunOutcome, ScenarioOutcome};
pub use report::ReportContext;
pub use volley_metrics::{MetricSeriesSummary, MetricValue, MetricsSnapshot, SeriesValue};
