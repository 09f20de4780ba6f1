use std::fmt;

use shared::domain::RecordId;
use thiserror::Error;

/// The remote call an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStep {
    Upload,
    Enhance,
    Generate,
    Refine,
    Download,
    Health,
}

impl RemoteStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Enhance => "prompt enhancement",
            Self::Generate => "image generation",
            Self::Refine => "design refinement",
            Self::Download => "download",
            Self::Health => "health check",
        }
    }

    /// Message used when a `success: false` body carries no error text.
    pub fn fallback_message(self) -> String {
        format!("{} failed", self.as_str())
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("'{media_type}' is not an image type")]
    UnsupportedType { media_type: String },
    #[error("file is {size_bytes} bytes, the limit is {limit_bytes} bytes")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    #[error("feedback is empty")]
    EmptyFeedback,
    #[error("there is no result to refine")]
    NoCurrentResult,
    #[error("no history entry with id {0}")]
    UnknownRecord(RecordId),
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("{0}")]
    Validation(ValidationErrorKind),
    #[error("{step} request failed: {message}")]
    Transport { step: RemoteStep, message: String },
    #[error("{message}")]
    Application { step: RemoteStep, message: String },
    #[error("unexpected {step} response: {message}")]
    Unexpected { step: RemoteStep, message: String },
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StagingError {
    pub fn transport(step: RemoteStep, message: impl Into<String>) -> Self {
        Self::Transport {
            step,
            message: message.into(),
        }
    }

    pub fn unexpected(step: RemoteStep, message: impl Into<String>) -> Self {
        Self::Unexpected {
            step,
            message: message.into(),
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn step(&self) -> Option<RemoteStep> {
        match self {
            Self::Transport { step, .. }
            | Self::Application { step, .. }
            | Self::Unexpected { step, .. } => Some(*step),
            Self::Validation(_) | Self::Storage(_) => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<ValidationErrorKind> for StagingError {
    fn from(kind: ValidationErrorKind) -> Self {
        Self::Validation(kind)
    }
}
