//! Queries against the two live diagnostics artifacts.
//!
//! The callable form `pg_firstAid()` and the view form `v_pgfirstaid` both
//! expose `check_name` and `object_name` columns. Parity between them is
//! computed server-side with `EXCEPT` in both directions.

use std::fmt;

use pgfa_harness_core::{CheckNameSet, ParityReport};
use serde::Serialize;

use crate::connection::DbConnection;
use crate::error::DbResult;

/// One SQL-level exposure of the diagnostics subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticArtifact {
    /// `pg_firstAid()`
    Function,
    /// `v_pgfirstaid`
    View,
}

impl DiagnosticArtifact {
    pub const ALL: [Self; 2] = [Self::Function, Self::View];

    /// Relation expression usable in a `FROM` clause.
    #[must_use]
    pub const fn relation_sql(self) -> &'static str {
        match self {
            Self::Function => "pg_firstAid()",
            Self::View => "v_pgfirstaid",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        self.relation_sql()
    }
}

impl fmt::Display for DiagnosticArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn finding_sql(artifact: DiagnosticArtifact) -> String {
    format!(
        "SELECT EXISTS (\
           SELECT 1 FROM {} \
           WHERE check_name = $1 \
             AND ($2::text IS NULL OR object_name LIKE $2)\
         )",
        artifact.relation_sql()
    )
}

fn except_sql(left: DiagnosticArtifact, right: DiagnosticArtifact) -> String {
    format!(
        "SELECT check_name::text FROM {} \
         EXCEPT \
         SELECT check_name::text FROM {}",
        left.relation_sql(),
        right.relation_sql()
    )
}

/// Stands in for a `NULL` check name so it still counts as an offender.
pub const NULL_CHECK_NAME: &str = "<NULL>";

fn name_or_placeholder(name: Option<String>) -> String {
    name.unwrap_or_else(|| NULL_CHECK_NAME.to_string())
}

fn collect_names(conn: &mut DbConnection, sql: &str) -> DbResult<Vec<String>> {
    let rows = conn.query(sql, &[])?;
    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        names.push(name_or_placeholder(row.try_get::<_, Option<String>>(0)?));
    }
    Ok(names)
}

/// Whether `artifact` currently reports `check_name`, optionally restricted
/// to rows whose `object_name` matches the `LIKE` pattern `object_like`.
pub fn reports_finding(
    conn: &mut DbConnection,
    artifact: DiagnosticArtifact,
    check_name: &str,
    object_like: Option<&str>,
) -> DbResult<bool> {
    let found = conn.query_bool(&finding_sql(artifact), &[&check_name, &object_like])?;
    tracing::debug!(%artifact, check_name, object_like, found, "finding lookup");
    Ok(found)
}

/// Distinct check names `artifact` reports right now, with a `NULL` name
/// listed as [`NULL_CHECK_NAME`].
pub fn check_names(
    conn: &mut DbConnection,
    artifact: DiagnosticArtifact,
) -> DbResult<CheckNameSet> {
    let sql = format!("SELECT DISTINCT check_name::text FROM {}", artifact.relation_sql());
    Ok(collect_names(conn, &sql)?.into_iter().collect())
}

/// `left EXCEPT right` and `right EXCEPT left`, both always evaluated.
pub fn live_parity(
    conn: &mut DbConnection,
    left: DiagnosticArtifact,
    right: DiagnosticArtifact,
) -> DbResult<ParityReport> {
    let missing_in_right = collect_names(conn, &except_sql(left, right))?;
    let extra_in_right = collect_names(conn, &except_sql(right, left))?;
    let report = ParityReport::from_differences(
        left.label(),
        right.label(),
        missing_in_right,
        extra_in_right,
    );
    if report.is_clean() {
        tracing::info!(%left, %right, "live check_name parity holds");
    } else {
        tracing::warn!(
            %left,
            %right,
            missing = ?report.missing_in_right,
            extra = ?report.extra_in_right,
            "live check_name parity broken"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_render_as_from_clause_targets() {
        assert_eq!(DiagnosticArtifact::Function.relation_sql(), "pg_firstAid()");
        assert_eq!(DiagnosticArtifact::View.relation_sql(), "v_pgfirstaid");
        assert_eq!(DiagnosticArtifact::View.to_string(), "v_pgfirstaid");
    }

    #[test]
    fn finding_query_binds_values_and_allows_missing_object_filter() {
        let sql = finding_sql(DiagnosticArtifact::View);
        assert!(sql.contains("FROM v_pgfirstaid"));
        assert!(sql.contains("check_name = $1"));
        assert!(sql.contains("$2::text IS NULL OR object_name LIKE $2"));
        assert!(!sql.contains("Outdated Statistics"));
    }

    #[test]
    fn null_check_name_is_kept_as_a_visible_offender() {
        assert_eq!(name_or_placeholder(None), NULL_CHECK_NAME);
        assert_eq!(name_or_placeholder(Some("Missing Indexes".into())), "Missing Indexes");

        let report = ParityReport::from_differences(
            DiagnosticArtifact::Function.label(),
            DiagnosticArtifact::View.label(),
            vec![name_or_placeholder(None)],
            Vec::new(),
        );
        assert!(!report.is_clean());
        assert!(report.ensure().unwrap_err().to_string().contains(NULL_CHECK_NAME));
    }

    #[test]
    fn except_query_is_directional() {
        let forward = except_sql(DiagnosticArtifact::Function, DiagnosticArtifact::View);
        let backward = except_sql(DiagnosticArtifact::View, DiagnosticArtifact::Function);
        assert_ne!(forward, backward);

        let except_at = forward.find("EXCEPT").unwrap();
        assert!(forward[..except_at].contains("pg_firstAid()"));
        assert!(forward[except_at..].contains("v_pgfirstaid"));

        let except_at = backward.find("EXCEPT").unwrap();
        assert!(backward[..except_at].contains("v_pgfirstaid"));
        assert!(backward[except_at..].contains("pg_firstAid()"));
    }
}
