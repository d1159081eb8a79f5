//! Single-connection factory.
//!
//! Every [`DbConnection`] is exclusively owned by the block that opened it
//! and closes when dropped, on success, error, or panic alike. There is no
//! pooling and no retry; callers decide what a failed connect means.

use std::path::Path;

use native_tls::TlsConnector;
use pgfa_harness_core::{HarnessConfig, SslMode, read_artifact};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;

use crate::error::DbResult;

/// Per-connection overrides on top of [`HarnessConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// When `false`, the first statement opens a transaction that stays
    /// open until [`DbConnection::commit`] or [`DbConnection::rollback`].
    pub autocommit: bool,
    /// Reported as `application_name` in `pg_stat_activity`.
    pub application_name: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            autocommit: true,
            application_name: None,
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tagged(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = Some(application_name.into());
        self
    }

    #[must_use]
    pub const fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }
}

/// An open PostgreSQL session.
pub struct DbConnection {
    client: Client,
    autocommit: bool,
    in_transaction: bool,
    application_name: Option<String>,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .field("application_name", &self.application_name)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl DbConnection {
    #[must_use]
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    #[must_use]
    pub const fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    fn begin_if_needed(&mut self) -> DbResult<()> {
        if !self.autocommit && !self.in_transaction {
            self.client.batch_execute("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run one or more statements through the simple-query protocol.
    pub fn batch_execute(&mut self, sql: &str) -> DbResult<()> {
        self.begin_if_needed()?;
        self.client.batch_execute(sql)?;
        Ok(())
    }

    pub fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        self.begin_if_needed()?;
        Ok(self.client.execute(sql, params)?)
    }

    pub fn query(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        self.begin_if_needed()?;
        Ok(self.client.query(sql, params)?)
    }

    /// First row of the result, if any. Extra rows are ignored.
    pub fn query_first(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DbResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// `SELECT EXISTS (...)`-style queries: the first column of the first row.
    pub fn query_bool(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<bool> {
        match self.query_first(sql, params)? {
            Some(row) => Ok(row.try_get::<_, Option<bool>>(0)?.unwrap_or(false)),
            None => Ok(false),
        }
    }

    pub fn commit(&mut self) -> DbResult<()> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        if self.in_transaction {
            self.client.batch_execute("ROLLBACK")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

fn tls_connector(mode: SslMode) -> DbResult<Option<MakeTlsConnector>> {
    if mode == SslMode::Disable {
        return Ok(None);
    }
    // libpq only validates the chain for verify-ca and the host for verify-full.
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!mode.verifies_certificate())
        .danger_accept_invalid_hostnames(!mode.verifies_hostname())
        .build()?;
    Ok(Some(MakeTlsConnector::new(connector)))
}

const fn client_ssl_mode(mode: SslMode) -> postgres::config::SslMode {
    match mode {
        SslMode::Disable => postgres::config::SslMode::Disable,
        SslMode::Allow | SslMode::Prefer => postgres::config::SslMode::Prefer,
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            postgres::config::SslMode::Require
        }
    }
}

fn client_config(config: &HarnessConfig, options: &ConnectOptions) -> postgres::Config {
    let mut pg = postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .dbname(&config.database)
        .ssl_mode(client_ssl_mode(config.ssl_mode.unwrap_or(SslMode::Prefer)));
    if let Some(password) = &config.password {
        pg.password(password);
    }
    if let Some(name) = &options.application_name {
        pg.application_name(name);
    }
    pg
}

/// Open one connection. Authentication, network, TLS, and protocol
/// failures are returned as-is.
pub fn connect(config: &HarnessConfig, options: &ConnectOptions) -> DbResult<DbConnection> {
    let pg = client_config(config, options);
    let mode = config.ssl_mode.unwrap_or(SslMode::Prefer);
    let client = match tls_connector(mode)? {
        Some(tls) => pg.connect(tls)?,
        None => pg.connect(NoTls)?,
    };
    tracing::debug!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        application_name = options.application_name.as_deref().unwrap_or(""),
        autocommit = options.autocommit,
        "connected"
    );
    Ok(DbConnection {
        client,
        autocommit: options.autocommit,
        in_transaction: false,
        application_name: options.application_name.clone(),
    })
}

/// Run a whole SQL script file as a single batch.
pub fn execute_sql_file(conn: &mut DbConnection, path: &Path) -> DbResult<()> {
    let sql = read_artifact(path)?;
    tracing::debug!(path = %path.display(), bytes = sql.len(), "executing SQL file");
    conn.batch_execute(&sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgres::config::Host;

    #[test]
    fn options_default_to_autocommit_without_tag() {
        let options = ConnectOptions::new();
        assert!(options.autocommit);
        assert_eq!(options.application_name, None);

        let options = ConnectOptions::new()
            .tagged("pgfirstaid_pytest_conn_7")
            .autocommit(false);
        assert!(!options.autocommit);
        assert_eq!(
            options.application_name.as_deref(),
            Some("pgfirstaid_pytest_conn_7")
        );
    }

    #[test]
    fn client_config_carries_connection_fields() {
        let config = HarnessConfig {
            host: "db.internal".into(),
            port: 6543,
            user: "auditor".into(),
            password: Some("hunter2".into()),
            database: "firstaid".into(),
            ..HarnessConfig::default()
        };
        let pg = client_config(&config, &ConnectOptions::new().tagged("tagged"));
        assert_eq!(pg.get_hosts(), &[Host::Tcp("db.internal".into())]);
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_user(), Some("auditor"));
        assert_eq!(pg.get_password(), Some(&b"hunter2"[..]));
        assert_eq!(pg.get_dbname(), Some("firstaid"));
        assert_eq!(pg.get_application_name(), Some("tagged"));
    }

    #[test]
    fn password_and_tag_are_optional() {
        let pg = client_config(&HarnessConfig::default(), &ConnectOptions::new());
        assert_eq!(pg.get_password(), None);
        assert_eq!(pg.get_application_name(), None);
    }

    #[test]
    fn ssl_modes_map_onto_client_modes() {
        use postgres::config::SslMode as Client;
        assert_eq!(client_ssl_mode(SslMode::Disable), Client::Disable);
        assert_eq!(client_ssl_mode(SslMode::Allow), Client::Prefer);
        assert_eq!(client_ssl_mode(SslMode::Prefer), Client::Prefer);
        assert_eq!(client_ssl_mode(SslMode::Require), Client::Require);
        assert_eq!(client_ssl_mode(SslMode::VerifyFull), Client::Require);
    }

    #[test]
    fn disable_skips_tls_connector() {
        assert!(tls_connector(SslMode::Disable).unwrap().is_none());
    }
}
