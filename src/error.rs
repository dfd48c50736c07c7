//! Error types for visionpipe.

use thiserror::Error;

/// Result type alias using visionpipe's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for visionpipe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A pixel-format tag has no internal buffer layout.
    #[error("unsupported video format: {0}")]
    UnsupportedFormat(String),

    /// A structurally valid format was declined by a stage.
    #[error("negotiation rejected by {stage}: {reason}")]
    NegotiationRejected {
        /// Stage that declined the format.
        stage: String,
        /// Why the format was declined.
        reason: String,
    },

    /// Chain construction failed; nothing from the attempt is left allocated.
    #[error("pipeline assembly failed at {stage}: {reason}")]
    AssemblyFailed {
        /// Stage (or link) that failed.
        stage: String,
        /// Underlying failure.
        reason: String,
    },

    /// Scratch or frame memory could not be allocated.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A frame region is smaller than its descriptor requires.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Operation not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Runtime element failure.
    #[error("element error: {0}")]
    Element(String),

    /// Invalid stage configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline description could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a negotiation rejection for `stage`.
    pub fn rejected(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NegotiationRejected {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Create an assembly failure for `stage`.
    pub fn assembly(stage: impl Into<String>, reason: impl ToString) -> Self {
        Self::AssemblyFailed {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the local negotiation errors a caller may retry with another candidate.
    pub fn is_negotiation_failure(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::NegotiationRejected { .. }
        )
    }

    /// True for errors that must tear down the owning chain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllocationFailed(_))
    }
}
