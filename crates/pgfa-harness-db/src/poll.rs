//! Bounded polling for server state that converges on its own schedule.
//!
//! Activity and statistics views (`pg_stat_activity`, `pg_stat_user_tables`)
//! are refreshed by the server independently of client statements, so a
//! test observes them by re-evaluating a predicate until it holds or the
//! timeout elapses. A timeout is an ordinary `false`; only an error raised
//! by the predicate itself propagates.

use std::thread;
use std::time::{Duration, Instant};

use pgfa_harness_core::HarnessConfig;
use postgres::types::ToSql;

use crate::connection::DbConnection;
use crate::error::DbResult;

/// Timeout/interval pair for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn from_config(config: &HarnessConfig) -> Self {
        Self {
            timeout: config.wait_timeout,
            interval: config.poll_interval,
        }
    }
}

/// Evaluate `check` until it returns `Ok(true)` or `timeout` has elapsed.
///
/// The predicate is evaluated at least once, immediately. Between
/// evaluations the loop sleeps for `interval`, clipped to the time left, so
/// an always-false predicate returns `Ok(false)` no earlier than `timeout`
/// and no later than `timeout` plus one evaluation.
pub fn poll_until<E, F>(settings: PollSettings, mut check: F) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        if check()? {
            tracing::debug!(
                attempts,
                elapsed_ms = start.elapsed().as_millis(),
                "poll condition observed"
            );
            return Ok(true);
        }
        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            tracing::debug!(
                attempts,
                timeout_ms = settings.timeout.as_millis(),
                "poll timed out"
            );
            return Ok(false);
        }
        thread::sleep(settings.interval.min(settings.timeout - elapsed));
    }
}

const CLEAR_STATS_SNAPSHOT_SQL: &str = "SELECT pg_stat_clear_snapshot()";

/// Poll a boolean query on `conn`; the first column of the first row is the
/// predicate value (no row or NULL counts as false).
///
/// Inside an open transaction the server keeps serving the first `pg_stat_*`
/// snapshot it took, so a non-autocommit connection drops that snapshot
/// before every attempt.
pub fn wait_for_sql_true(
    conn: &mut DbConnection,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
    settings: PollSettings,
) -> DbResult<bool> {
    let fresh_snapshot = !conn.is_autocommit();
    poll_until(settings, || {
        if fresh_snapshot {
            conn.execute(CLEAR_STATS_SNAPSHOT_SQL, &[])?;
        }
        conn.query_bool(sql, params)
    })
}
