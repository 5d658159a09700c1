use thiserror::Error;

/// Rejected assembler or synchronizer parameters. Raised before any input is
/// examined.
#[derive(Debug, Error, PartialEq)]
pub enum AssembleError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why one script file was abandoned.
///
/// Everything except [`StageError::Config`] is turned into a skip by the batch
/// driver; configuration problems are found by the environment check and end
/// the whole run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("render failed: {0}")]
    RenderFailure(String),

    #[error("external service failed: {0}")]
    ExternalService(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Config(_))
    }
}

impl From<AssembleError> for StageError {
    fn from(err: AssembleError) -> Self {
        StageError::Config(err.to_string())
    }
}
