//! End-to-end detection scenarios against a live database.
//!
//! Each scenario drives real workload, waits for the server's own counters
//! to catch up, and then asks both diagnostic artifacts whether they noticed.
//! Results come back as reports with a [`ScenarioOutcome`]; deciding whether
//! an outcome fails a test run is left to the caller.

use std::path::Path;

use pgfa_harness_core::{HarnessConfig, ParityReport, RepoLayout, ViewMode, display_name};
use serde::Serialize;

use crate::artifacts::{DiagnosticArtifact, live_parity, reports_finding};
use crate::connection::DbConnection;
use crate::error::DbResult;
use crate::fixtures::{install_default_view, install_view};
use crate::ident::SqlIdent;
use crate::load::{LoadGenerator, LoadPlan, PgWorkerBackend, WorkerOutcome};
use crate::poll::{PollSettings, wait_for_sql_true};

pub const OUTDATED_STATS_TABLE: &str = "outdated_stats_table";
pub const OUTDATED_STATISTICS: &str = "Outdated Statistics";
pub const HIGH_CONNECTION_COUNT: &str = "High Connection Count";
/// `application_name` prefix for load workers; the worker id is appended.
pub const CONNECTION_TAG_PREFIX: &str = "pgfirstaid_pytest_conn_";

const STALE_ROWS: i32 = 2000;
const UPDATED_UP_TO: i32 = 800;
const DELETED_ABOVE: i32 = 1200;
const MIN_MODIFICATIONS: i64 = 150;

const STATS_VISIBLE_SQL: &str = "\
    SELECT EXISTS (\
      SELECT 1 FROM pg_stat_user_tables \
      WHERE schemaname = $1 AND relname = $2 AND n_mod_since_analyze > $3\
    )";

const ACTIVE_SESSIONS_SQL: &str = "\
    SELECT count(*) >= $1 \
    FROM pg_stat_activity \
    WHERE application_name LIKE $2 \
      AND state = 'active'";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed { reason: String },
    /// The environment could not produce the conditions under test.
    Skipped { reason: String, successes: usize },
}

impl ScenarioOutcome {
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Whether one artifact reported one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindingCheck {
    pub artifact: DiagnosticArtifact,
    pub check_name: String,
    pub found: bool,
}

fn check_findings(
    conn: &mut DbConnection,
    check_name: &str,
    object_like: Option<&str>,
) -> DbResult<Vec<FindingCheck>> {
    DiagnosticArtifact::ALL
        .into_iter()
        .map(|artifact| {
            Ok(FindingCheck {
                artifact,
                check_name: check_name.to_string(),
                found: reports_finding(conn, artifact, check_name, object_like)?,
            })
        })
        .collect()
}

fn missing_findings(findings: &[FindingCheck]) -> Option<String> {
    let missing: Vec<String> = findings
        .iter()
        .filter(|f| !f.found)
        .map(|f| format!("{} did not report {}", f.artifact, f.check_name))
        .collect();
    (!missing.is_empty()).then(|| missing.join("; "))
}

// ---------------------------------------------------------------------------
// Outdated statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleStatsReport {
    pub table: String,
    /// `pg_stat_user_tables` showed the modifications within the timeout.
    pub stats_visible: bool,
    /// Empty when the statistics never became visible.
    pub findings: Vec<FindingCheck>,
}

impl StaleStatsReport {
    #[must_use]
    pub fn outcome(&self) -> ScenarioOutcome {
        if !self.stats_visible {
            return ScenarioOutcome::Failed {
                reason: format!(
                    "pg_stat_user_tables never showed modified rows for {}",
                    self.table
                ),
            };
        }
        missing_findings(&self.findings)
            .map_or(ScenarioOutcome::Passed, |reason| ScenarioOutcome::Failed { reason })
    }
}

fn stale_stats_statements(table: &str) -> [String; 5] {
    [
        format!(
            "CREATE TABLE {table} (id serial PRIMARY KEY, data text) \
             WITH (autovacuum_enabled = false)"
        ),
        format!(
            "INSERT INTO {table} (data) SELECT md5(g::text) FROM generate_series(1, {STALE_ROWS}) g"
        ),
        format!("ANALYZE {table}"),
        format!("UPDATE {table} SET data = md5(data) WHERE id <= {UPDATED_UP_TO}"),
        format!("DELETE FROM {table} WHERE id > {DELETED_ABOVE}"),
    ]
}

/// Build a table whose planner statistics are stale, wait until the server
/// counts the modifications, then ask both artifacts for the finding.
pub fn outdated_statistics(
    conn: &mut DbConnection,
    schema: &SqlIdent,
    settings: PollSettings,
) -> DbResult<StaleStatsReport> {
    let table_ident = SqlIdent::new(OUTDATED_STATS_TABLE)?;
    let table = schema.qualify(&table_ident);
    for statement in stale_stats_statements(&table) {
        conn.batch_execute(&statement)?;
    }
    tracing::info!(%table, "stale statistics workload applied");

    let stats_visible = wait_for_sql_true(
        conn,
        STATS_VISIBLE_SQL,
        &[&schema.catalog_name(), &table_ident.catalog_name(), &MIN_MODIFICATIONS],
        settings,
    )?;
    if !stats_visible {
        tracing::warn!(%table, "modification counters never became visible");
        return Ok(StaleStatsReport {
            table,
            stats_visible,
            findings: Vec::new(),
        });
    }

    let pattern = format!("%{OUTDATED_STATS_TABLE}%");
    let findings = check_findings(conn, OUTDATED_STATISTICS, Some(&pattern))?;
    Ok(StaleStatsReport {
        table,
        stats_visible,
        findings,
    })
}

// ---------------------------------------------------------------------------
// High connection count
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionLoadReport {
    pub target: usize,
    pub launched: usize,
    pub successes: usize,
    /// The activity view showed at least `target` tagged active sessions.
    pub saturated: bool,
    /// Empty when the target was never reached.
    pub findings: Vec<FindingCheck>,
    pub worker_failures: Vec<WorkerOutcome>,
    pub elapsed_ms: u64,
}

impl ConnectionLoadReport {
    #[must_use]
    pub fn outcome(&self) -> ScenarioOutcome {
        if !self.saturated {
            return ScenarioOutcome::Skipped {
                reason: format!(
                    "Could not establish {} active test sessions to cross the \
                     {HIGH_CONNECTION_COUNT} threshold",
                    self.target
                ),
                successes: self.successes,
            };
        }
        if let Some(reason) = missing_findings(&self.findings) {
            return ScenarioOutcome::Failed { reason };
        }
        if self.successes == 0 {
            return ScenarioOutcome::Failed {
                reason: format!("none of the {} load workers completed", self.launched),
            };
        }
        ScenarioOutcome::Passed
    }
}

/// `LIKE` pattern matching every load worker's `application_name`.
fn worker_tag_pattern() -> String {
    format!("{CONNECTION_TAG_PREFIX}%")
}

/// Push the tagged active-session count past the configured target and
/// check both artifacts report it while the sessions are still held.
pub fn high_connection_count(
    config: &HarnessConfig,
    conn: &mut DbConnection,
) -> DbResult<ConnectionLoadReport> {
    let plan = LoadPlan::from_config(config);
    let settings = PollSettings::from_config(config);
    let target = i64::try_from(plan.target).unwrap_or(i64::MAX);
    let tag_pattern = worker_tag_pattern();
    let backend = PgWorkerBackend::new(config);
    let generator = LoadGenerator::new(&backend, plan, CONNECTION_TAG_PREFIX);

    let load = generator.run(|| {
        let saturated =
            wait_for_sql_true(conn, ACTIVE_SESSIONS_SQL, &[&target, &tag_pattern], settings)?;
        if !saturated {
            tracing::warn!(target_sessions = target, "active session target never reached");
            return Ok((false, Vec::new()));
        }
        Ok((true, check_findings(conn, HIGH_CONNECTION_COUNT, None)?))
    })?;

    let successes = load.successes();
    let worker_failures = load.failures().into_iter().cloned().collect();
    let (saturated, findings) = load.observed;
    Ok(ConnectionLoadReport {
        target: plan.target,
        launched: load.launched,
        successes,
        saturated,
        findings,
        worker_failures,
        elapsed_ms: load.elapsed_ms,
    })
}

// ---------------------------------------------------------------------------
// View variant parity
// ---------------------------------------------------------------------------

/// Install each view file `mode` selects and compare the live view against
/// the callable in both directions. The default view is reinstalled after
/// every variant, including when the comparison itself errors.
pub fn view_variant_parity(
    conn: &mut DbConnection,
    layout: &RepoLayout,
    mode: ViewMode,
) -> DbResult<Vec<ParityReport>> {
    let mut reports = Vec::new();
    for view_file in layout.view_files(mode) {
        let compared = compare_installed_view(conn, &view_file);
        if let Err(e) = &compared {
            tracing::warn!(
                view_file = %view_file.display(),
                error = %e,
                "view comparison failed; reinstalling default view"
            );
        }
        let restored = install_default_view(conn, layout, mode);
        reports.push(first_error(compared, restored)?);
    }
    Ok(reports)
}

/// The comparison result wins over a failed restore.
fn first_error<T>(compared: DbResult<T>, restored: DbResult<()>) -> DbResult<T> {
    let value = compared?;
    restored?;
    Ok(value)
}

fn compare_installed_view(conn: &mut DbConnection, view_file: &Path) -> DbResult<ParityReport> {
    install_view(conn, view_file)?;
    let report = live_parity(conn, DiagnosticArtifact::Function, DiagnosticArtifact::View)?;
    Ok(ParityReport {
        right: format!("{} ({})", report.right, display_name(view_file)),
        ..report
    })
}
