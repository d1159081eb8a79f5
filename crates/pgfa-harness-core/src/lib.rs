//! Core types for the pgFirstAid integration harness
//!
//! This crate provides:
//! - Configuration (`HarnessConfig`, environment parsing)
//! - Repository layout of the SQL artifacts under test
//! - Check-name extraction and bidirectional parity reports
//! - Common error types

#![forbid(unsafe_code)]

pub mod check_names;
pub mod config;
pub mod error;
pub mod layout;

// Re-export key types for convenience
pub use check_names::{
    CheckNameSet, ParityReport, extract_from_pgtap, extract_from_source, pgtap_check_names,
    pgtap_coverage, source_file_check_names, view_file_coverage, view_variant_file_parity,
};
pub use config::{HarnessConfig, SslMode, ViewMode};
pub use error::{Error as HarnessError, Result as HarnessResult};
pub use layout::{RepoLayout, display_name, read_artifact};
