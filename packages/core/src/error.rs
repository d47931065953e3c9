use crate::orchestrator::ExportState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReframeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Video metadata is not available yet")]
    MetadataUnavailable,

    #[error("Background generation failed: {0}")]
    BackgroundGeneration(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Export produced no data")]
    EmptyOutput,

    #[error("An export is already active (state: {0})")]
    ExportActive(ExportState),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl ReframeError {
    /// Whether this error ends the current export attempt.
    ///
    /// `ExportActive` is a rejected request, not a failure of the running
    /// export, so it is the only variant that leaves the session untouched.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReframeError::ExportActive(_))
    }
}

pub type ReframeResult<T> = Result<T, ReframeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_readable() {
        let err = ReframeError::BackgroundGeneration("quota exceeded".into());
        assert_eq!(
            err.to_string(),
            "Background generation failed: quota exceeded"
        );
        assert_eq!(ReframeError::EmptyOutput.to_string(), "Export produced no data");
    }

    #[test]
    fn test_rejection_is_not_terminal() {
        assert!(!ReframeError::ExportActive(ExportState::Recording).is_terminal());
        assert!(ReframeError::EmptyOutput.is_terminal());
        assert!(ReframeError::CaptureError("x".into()).is_terminal());
    }
}
