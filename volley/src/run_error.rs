use volley_core::Phase;

use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    ExecutionFailed(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::ExecutionFailed(_) => ExitCode::ExecutionFailed,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::ExecutionFailed(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<volley_core::Error> for RunError {
    fn from(err: volley_core::Error) -> Self {
        match err.phase() {
            Phase::Definition | Phase::Construction => Self::InvalidInput(err.into()),
            Phase::Execution => Self::ExecutionFailed(err.into()),
            Phase::Runtime => Self::RuntimeError(err.into()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::ExecutionFailed(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}
