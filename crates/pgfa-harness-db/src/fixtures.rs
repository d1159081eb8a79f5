//! Session-scoped database fixtures with guaranteed teardown.
//!
//! Both guards undo their setup in `Drop`, so the database is restored on
//! every exit path including panics in the code that holds them. Teardown
//! failures are logged and swallowed; `Drop` cannot report them.

use std::path::{Path, PathBuf};

use pgfa_harness_core::{HarnessConfig, RepoLayout, ViewMode, display_name};

use crate::connection::{ConnectOptions, DbConnection, connect, execute_sql_file};
use crate::error::DbResult;
use crate::ident::SqlIdent;

/// Setup script applied; teardown script runs when dropped.
#[derive(Debug)]
pub struct PreparedDatabase<'a> {
    config: &'a HarnessConfig,
    teardown: PathBuf,
}

impl<'a> PreparedDatabase<'a> {
    /// Run the setup script on a fresh autocommit connection.
    pub fn prepare(config: &'a HarnessConfig, layout: &RepoLayout) -> DbResult<Self> {
        let setup = layout.setup_sql();
        let mut conn = connect(config, &ConnectOptions::new())?;
        execute_sql_file(&mut conn, &setup)?;
        tracing::info!(script = %display_name(&setup), "database prepared");
        Ok(Self {
            config,
            teardown: layout.teardown_sql(),
        })
    }

    fn teardown(&self) -> DbResult<()> {
        let mut conn = connect(self.config, &ConnectOptions::new())?;
        execute_sql_file(&mut conn, &self.teardown)
    }
}

impl Drop for PreparedDatabase<'_> {
    fn drop(&mut self) {
        match self.teardown() {
            Ok(()) => {
                tracing::info!(script = %display_name(&self.teardown), "database torn down");
            }
            Err(e) => {
                tracing::warn!(
                    script = %display_name(&self.teardown),
                    error = %e,
                    "teardown failed"
                );
            }
        }
    }
}

/// An isolated schema dropped (with `CASCADE`) when the guard goes away.
#[derive(Debug)]
pub struct TestSchema {
    name: SqlIdent,
    conn: DbConnection,
}

impl TestSchema {
    /// Default schema name for scenario objects.
    pub const DEFAULT_NAME: &'static str = "pgfirstaid_pytest";

    pub fn create(config: &HarnessConfig, name: &str) -> DbResult<Self> {
        let name = SqlIdent::new(name)?;
        let mut conn = connect(config, &ConnectOptions::new())?;
        conn.batch_execute(&create_schema_sql(&name))?;
        tracing::debug!(schema = %name, "test schema created");
        Ok(Self { name, conn })
    }

    #[must_use]
    pub const fn name(&self) -> &SqlIdent {
        &self.name
    }
}

impl Drop for TestSchema {
    fn drop(&mut self) {
        let sql = drop_schema_sql(&self.name);
        if let Err(e) = self.conn.batch_execute(&sql) {
            tracing::warn!(schema = %self.name, error = %e, "failed to drop test schema");
        }
    }
}

fn create_schema_sql(name: &SqlIdent) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {name}")
}

fn drop_schema_sql(name: &SqlIdent) -> String {
    format!("DROP SCHEMA IF EXISTS {name} CASCADE")
}

/// Install a view definition file.
pub fn install_view(conn: &mut DbConnection, view_sql: &Path) -> DbResult<()> {
    execute_sql_file(conn, view_sql)?;
    tracing::debug!(view = %display_name(view_sql), "view installed");
    Ok(())
}

/// Install the view `mode` selects as the default.
pub fn install_default_view(
    conn: &mut DbConnection,
    layout: &RepoLayout,
    mode: ViewMode,
) -> DbResult<()> {
    install_view(conn, &layout.default_view_file(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_ddl_uses_validated_name() {
        let name = SqlIdent::new(TestSchema::DEFAULT_NAME).unwrap();
        assert_eq!(
            create_schema_sql(&name),
            "CREATE SCHEMA IF NOT EXISTS pgfirstaid_pytest"
        );
        assert_eq!(
            drop_schema_sql(&name),
            "DROP SCHEMA IF EXISTS pgfirstaid_pytest CASCADE"
        );
    }

    #[test]
    fn schema_name_is_checked_before_connecting() {
        // Port 1 is never a PostgreSQL server; the identifier check must fail first.
        let config = HarnessConfig {
            port: 1,
            ..HarnessConfig::default()
        };
        let err = TestSchema::create(&config, "x; DROP DATABASE postgres").unwrap_err();
        assert!(matches!(err, crate::error::DbError::InvalidIdentifier(_)));
    }
}
