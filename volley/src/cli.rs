use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress and a plain-text report.
    HumanReadable,
    /// A single JSON summary line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Scenario-driven load generator",
    long_about = "volley runs the scenarios of a YAML test definition on a pool of workers.\n\nEach scenario names an executor (constant-vus, ramping-vus, per-vu-iterations, shared-iterations) that decides how many virtual users run its action and for how long.",
    after_help = "Examples:\n  volley run smoke.yaml\n  volley run smoke.yaml --vus 50 --duration 30s\n  volley run smoke.yaml --iterations 1000 --output json"
)]
pub struct Cli {
    /// Log filter directives (e.g. `info`, `volley_core=debug`); overrides RUST_LOG
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a test definition
    #[command(
        long_about = "Run every scenario of a test definition concurrently and print a report.\n\nCLI flags override values from each scenario's options. A ramping-vus scenario runs as constant-vus when --vus, --iterations or --duration is given."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the test definition (.yaml)
    pub definition: PathBuf,

    /// Worker count (defaults to the number of available CPUs)
    #[arg(long, env = "VOLLEY_WORKERS")]
    pub workers: Option<usize>,

    /// Override iterations of every scenario
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Override virtual users of every scenario
    #[arg(long)]
    pub vus: Option<u64>,

    /// Override scenario duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Disable the live progress display
    #[arg(long)]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "volley",
            "run",
            "smoke.yaml",
            "--workers",
            "3",
            "--iterations",
            "10",
            "--vus",
            "2",
            "--duration",
            "250ms",
            "--output",
            "json",
            "--no-progress",
            "--log-level",
            "debug",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Run(args) = cli.command;
        assert_eq!(args.definition, PathBuf::from("smoke.yaml"));
        assert_eq!(args.workers, Some(3));
        assert_eq!(args.iterations, Some(10));
        assert_eq!(args.vus, Some(2));
        assert_eq!(args.duration, Some(Duration::from_millis(250)));
        assert_eq!(args.output, OutputFormat::Json);
        assert!(args.no_progress);
    }

    #[test]
    fn cli_run_defaults() {
        let parsed = Cli::try_parse_from(["volley", "run", "smoke.yaml"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        assert_eq!(cli.log_level, None);
        let Command::Run(args) = cli.command;
        assert_eq!(args.iterations, None);
        assert_eq!(args.vus, None);
        assert_eq!(args.duration, None);
        assert_eq!(args.output, OutputFormat::HumanReadable);
        assert!(!args.no_progress);
    }

    #[test]
    fn cli_rejects_bad_duration() {
        let parsed = Cli::try_parse_from(["volley", "run", "smoke.yaml", "--duration", "10x"]);
        assert!(parsed.is_err());
    }
}
