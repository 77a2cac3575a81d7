//! Lighting error taxonomy

use thiserror::Error;

use crate::id::LightId;

/// Errors surfaced by the lighting pipeline.
///
/// None of these cross the `update` boundary: each one is resolved inside the
/// frame according to its [`ErrorClass`] and reported through logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LightingError {
    #[error("shadow map pool exhausted: requested {requested} bytes, {available} of {budget} available")]
    PoolExhausted {
        requested: u64,
        available: u64,
        budget: u64,
    },

    #[error("invalid shadow settings '{name}': {reason}")]
    InvalidShadowSettings { name: String, reason: String },

    #[error("shadow generator aborted for light {light}: {reason}")]
    GeneratorAborted { light: LightId, reason: String },

    #[error("driver submission failed: {0}")]
    DriverSubmissionFailure(String),
}

/// How the pipeline recovers from an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Degrade the light (skip shadow, lower LOD) and continue the frame
    DegradeLight,
    /// Fall back to system default settings
    RegenerateSettings,
    /// Exclude the light this frame and retry next frame
    RetryNextFrame,
    /// Drop the current frame; the next frame starts clean
    DropFrame,
}

impl LightingError {
    pub fn invalid_settings(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidShadowSettings {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn aborted(light: LightId, reason: impl Into<String>) -> Self {
        Self::GeneratorAborted {
            light,
            reason: reason.into(),
        }
    }

    /// Recovery class for this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PoolExhausted { .. } => ErrorClass::DegradeLight,
            Self::InvalidShadowSettings { .. } => ErrorClass::RegenerateSettings,
            Self::GeneratorAborted { .. } => ErrorClass::RetryNextFrame,
            Self::DriverSubmissionFailure(_) => ErrorClass::DropFrame,
        }
    }

    /// True for everything except frame-fatal driver failures
    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::DropFrame
    }
}

/// Result type for lighting operations
pub type LightingResult<T> = Result<T, LightingError>;

/// Errors reported by a render driver implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),

    #[error("unknown surface handle {0}")]
    UnknownSurface(u64),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("state object creation failed: {0}")]
    StateCreation(String),

    #[error("draw submission rejected: {0}")]
    Submission(String),

    #[error("constant upload failed: {0}")]
    ConstantUpload(String),

    #[error("device lost")]
    DeviceLost,
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

impl From<DriverError> for LightingError {
    fn from(err: DriverError) -> Self {
        LightingError::DriverSubmissionFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let exhausted = LightingError::PoolExhausted {
            requested: 1024,
            available: 0,
            budget: 4096,
        };
        assert_eq!(exhausted.class(), ErrorClass::DegradeLight);
        assert!(exhausted.is_recoverable());

        let invalid = LightingError::invalid_settings("ultra", "bad precision");
        assert_eq!(invalid.class(), ErrorClass::RegenerateSettings);

        let aborted = LightingError::aborted(LightId::new(1, 0), "removed");
        assert_eq!(aborted.class(), ErrorClass::RetryNextFrame);

        let fatal = LightingError::DriverSubmissionFailure("lost".into());
        assert_eq!(fatal.class(), ErrorClass::DropFrame);
        assert!(!fatal.is_recoverable());
    }

    #[test]
    fn test_driver_error_converts_to_submission_failure() {
        let err: LightingError = DriverError::DeviceLost.into();
        assert_eq!(err, LightingError::DriverSubmissionFailure("device lost".into()));
    }

    #[test]
    fn test_error_display() {
        let err = LightingError::PoolExhausted {
            requested: 10,
            available: 4,
            budget: 8,
        };
        assert_eq!(
            err.to_string(),
            "shadow map pool exhausted: requested 10 bytes, 4 of 8 available"
        );
    }
}
