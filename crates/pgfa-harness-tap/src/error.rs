//! Error types for pgTAP execution

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pgTAP operations
pub type TapResult<T> = std::result::Result<T, TapError>;

#[derive(Debug, Error)]
pub enum TapError {
    #[error("Failed to launch {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pgTAP file failed: {script}\npsql exited with {exit_code}\n\n{output}")]
    NonZeroExit {
        script: String,
        exit_code: i32,
        output: String,
    },

    #[error(
        "pgTAP assertions failed in {script}:\n{}\n\nFull output:\n{output}",
        .failures.join("\n")
    )]
    AssertionsFailed {
        script: String,
        failures: Vec<String>,
        output: String,
    },

    #[error(transparent)]
    Core(#[from] pgfa_harness_core::HarnessError),
}
