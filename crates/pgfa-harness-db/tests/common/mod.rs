//! Shared helpers for tests that need a live PostgreSQL.
//!
//! Connection settings come from the usual `PG*` variables; `PGFA_REPO_ROOT`
//! must point at a pgFirstAid checkout for anything that installs SQL files.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};

use pgfa_harness_core::HarnessConfig;

static SESSION: Mutex<()> = Mutex::new(());

/// Tests in one binary share the database; hold this for the whole test.
pub fn serial() -> MutexGuard<'static, ()> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn live_config() -> HarnessConfig {
    HarnessConfig::from_env().expect("harness configuration from environment")
}
