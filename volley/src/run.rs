use std::io::IsTerminal as _;
use std::num::NonZeroUsize;
use std::sync::Arc;

use volley_core::pool::LocalPool;
use volley_core::{Orchestrator, ProgressMode, ReportFormat, RunConfig, YamlFile};

use crate::cli::{OutputFormat, RunArgs};
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<(), RunError> {
    let workers = match args.workers {
        Some(0) => {
            return Err(RunError::InvalidInput(anyhow::anyhow!(
                "--workers must be at least 1"
            )));
        }
        Some(n) => n,
        None => default_workers(),
    };

    let cfg = run_config(&args, std::io::stdout().is_terminal());
    let source = YamlFile::new(&args.definition);
    let pool = Arc::new(LocalPool::new(workers));

    tracing::debug!(
        definition = %args.definition.display(),
        workers,
        "starting volley run"
    );

    Orchestrator::new(pool, std::io::stdout(), cfg)
        .run(&source)
        .await?;
    Ok(())
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn run_config(args: &RunArgs, interactive: bool) -> RunConfig {
    let report = match args.output {
        OutputFormat::HumanReadable => ReportFormat::Human,
        OutputFormat::Json => ReportFormat::Json,
    };
    // Live redraws need a terminal, and JSON output must stay machine-readable.
    let progress = if args.no_progress || !interactive || report == ReportFormat::Json {
        ProgressMode::Off
    } else {
        ProgressMode::Live
    };

    RunConfig {
        vus: args.vus,
        iterations: args.iterations,
        duration: args.duration,
        progress,
        report,
        ..RunConfig::default()
    }
}
