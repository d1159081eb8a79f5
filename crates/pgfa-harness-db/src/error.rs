//! Error types for the database layer

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection, authentication, protocol, or query failure reported by
    /// the PostgreSQL client.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    /// TLS connector could not be built for the requested `sslmode`.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    /// Identifier rejected by the interpolation allow-list.
    #[error("Invalid SQL identifier {0:?}: expected [A-Za-z_][A-Za-z0-9_]* (at most 63 bytes)")]
    InvalidIdentifier(String),

    /// Configuration, artifact, or parity error from the harness core.
    #[error(transparent)]
    Core(#[from] pgfa_harness_core::HarnessError),
}

/// Result type alias for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;
