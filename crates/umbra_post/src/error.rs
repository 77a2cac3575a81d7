//! Post-process errors

use thiserror::Error;
use umbra_driver::DriverError;

use crate::stage::StageInput;

/// Errors raised by the image processing chain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostError {
    #[error("stage '{stage}' needs {input:?}, which this frame does not provide")]
    MissingInput { stage: String, input: StageInput },

    #[error("stage '{stage}' has no work surface; it did not ask for one")]
    NoWorkSurface { stage: String },

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("a stage named '{0}' is already in the chain")]
    DuplicateStage(String),

    #[error("invalid config for '{stage}': {reason}")]
    InvalidConfig { stage: String, reason: String },

    #[error("viewport {0}x{1} is empty")]
    EmptyViewport(u32, u32),

    #[error("no render target format for the chain")]
    NoTargetFormat,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl PostError {
    pub fn invalid_config(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for post-process operations
pub type PostResult<T> = Result<T, PostError>;
