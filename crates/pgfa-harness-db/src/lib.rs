//! Live PostgreSQL layer for the pgFirstAid integration harness
//!
//! This crate provides:
//! - Single connections with optional `application_name` tagging
//! - Bounded polling for eventually-visible server statistics
//! - A gated connection-saturation load generator
//! - Queries against the callable and view diagnostics artifacts
//! - Setup/teardown fixtures and the end-to-end detection scenarios
//!
//! # Identifiers
//!
//! Values are always bound as parameters. Schema and table names go through
//! [`SqlIdent`], which only admits plain unquoted identifiers.

#![forbid(unsafe_code)]

pub mod artifacts;
pub mod connection;
pub mod error;
pub mod fixtures;
pub mod ident;
pub mod load;
pub mod poll;
pub mod scenarios;

pub use artifacts::{
    DiagnosticArtifact, NULL_CHECK_NAME, check_names, live_parity, reports_finding,
};
pub use connection::{ConnectOptions, DbConnection, connect, execute_sql_file};
pub use error::{DbError, DbResult};
pub use fixtures::{PreparedDatabase, TestSchema, install_default_view, install_view};
pub use ident::SqlIdent;
pub use load::{
    LoadGenerator, LoadPlan, LoadReport, LoadWorker, PgWorkerBackend, StartGate, WorkerBackend,
    WorkerFailure, WorkerOutcome,
};
pub use poll::{PollSettings, poll_until, wait_for_sql_true};
pub use scenarios::{
    CONNECTION_TAG_PREFIX, ConnectionLoadReport, FindingCheck, HIGH_CONNECTION_COUNT,
    OUTDATED_STATISTICS, OUTDATED_STATS_TABLE, ScenarioOutcome, StaleStatsReport,
    high_connection_count, outdated_statistics, view_variant_parity,
};
