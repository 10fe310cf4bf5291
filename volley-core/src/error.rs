use crate::pool::WorkerError;

pub type Result<T> = std::result::Result<T, Error>;

/// Run phase an error belongs to. Used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Definition,
    Construction,
    Execution,
    Runtime,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read test definition `{path}`: {source}")]
    ReadDefinition {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid test definition: {0}")]
    Definition(String),

    #[error("test definition has no `options.scenarios`")]
    MissingOptions,

    #[error("scenario `{0}` is declared more than once")]
    DuplicateScenario(String),

    #[error("scenario `{scenario}`: {source}")]
    Scenario {
        scenario: String,
        #[source]
        source: ScenarioError,
    },

    #[error("worker pool has no workers")]
    EmptyPool,

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("scenario `{scenario}` failed: {source}")]
    Execution {
        scenario: String,
        #[source]
        source: WorkerError,
    },

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn scenario(scenario: &str, source: ScenarioError) -> Self {
        Self::Scenario {
            scenario: scenario.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::ReadDefinition { .. }
            | Self::Definition(_)
            | Self::MissingOptions
            | Self::DuplicateScenario(_) => Phase::Definition,
            Self::Scenario { source, .. } => match source {
                ScenarioError::UnknownExec(_) => Phase::Definition,
                _ => Phase::Construction,
            },
            Self::EmptyPool => Phase::Construction,
            Self::Execution { .. } => Phase::Execution,
            Self::PoolClosed | Self::Join(_) | Self::Output(_) | Self::Encode(_) => Phase::Runtime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error(
        "unknown executor `{0}` (expected `constant-vus`, `ramping-vus`, `per-vu-iterations`, or `shared-iterations`)"
    )]
    UnknownExecutor(String),

    #[error("unknown exec `{0}` (not found in the `exec` table)")]
    UnknownExec(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`stages` must be a non-empty array of {{ duration, target }} with a non-zero total")]
    InvalidStages,

    #[error("`{0}` must be a positive duration")]
    InvalidDuration(&'static str),

    #[error("`{option}` is not supported by the `{executor}` executor")]
    UnsupportedOption {
        option: &'static str,
        executor: &'static str,
    },
}
