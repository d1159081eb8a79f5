//! Error types for the harness core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness core
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    // ==========================================================================
    // Artifact Errors
    // ==========================================================================
    #[error("Failed to read SQL artifact {}: {source}", .path.display())]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pgTAP file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    // ==========================================================================
    // Parity Errors
    // ==========================================================================
    #[error(
        "check_name parity mismatch between {left} and {right}: \
         missing in {right}: [{}]; extra in {right}: [{}]",
        .missing_in_right.join(", "),
        .extra_in_right.join(", ")
    )]
    ParityMismatch {
        left: String,
        right: String,
        missing_in_right: Vec<String>,
        extra_in_right: Vec<String>,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable category, used in JSON reports.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::ReadArtifact { .. } | Self::Io(_) => "OS_ERROR",
            Self::Pattern(_) => "INVALID_ARGUMENT",
            Self::ParityMismatch { .. } => "PARITY_MISMATCH",
        }
    }
}
