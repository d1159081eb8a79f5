//! pgTAP execution for the pgFirstAid integration harness
//!
//! This crate provides:
//! - `PsqlRunner`: invokes `psql` non-interactively against one script
//! - `TapOutcome`: exit status, combined output, and failing TAP lines
//! - `RunReport`: aggregate of a whole numbered suite
//!
//! A script passes only when `psql` exits 0 *and* no line of its output
//! matches `not ok N`. Either condition alone is a failure.

#![forbid(unsafe_code)]

pub mod error;
pub mod outcome;
pub mod runner;

pub use error::{TapError, TapResult};
pub use outcome::{TapOutcome, tap_failures, tap_passes};
pub use runner::{PsqlRunner, RunReport};
