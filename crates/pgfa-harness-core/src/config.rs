//! Harness configuration
//!
//! Configuration is resolved once per run from libpq-style environment
//! variables (`PGHOST`, `PGPORT`, ...) plus `PGFA_*` harness knobs, then
//! passed by reference to every component. Nothing else in the workspace
//! reads the process environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// libpq `sslmode` values accepted in `PGSSLMODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disable" => Some(Self::Disable),
            "allow" => Some(Self::Allow),
            "prefer" => Some(Self::Prefer),
            "require" => Some(Self::Require),
            "verify-ca" => Some(Self::VerifyCa),
            "verify-full" => Some(Self::VerifyFull),
            _ => None,
        }
    }

    /// The libpq spelling, as exported to `psql` via `PGSSLMODE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Whether the server certificate chain must be validated.
    #[must_use]
    pub const fn verifies_certificate(self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Whether the hostname must match the certificate.
    #[must_use]
    pub const fn verifies_hostname(self) -> bool {
        matches!(self, Self::VerifyFull)
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which view variant(s) of the diagnostics subsystem a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Both,
    Managed,
    SelfHosted,
}

impl ViewMode {
    /// Unrecognized values select [`ViewMode::Both`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "managed" => Self::Managed,
            "self_hosted" | "self-hosted" => Self::SelfHosted,
            _ => Self::Both,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::Managed => "managed",
            Self::SelfHosted => "self_hosted",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable harness configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    // Connection
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: Option<SslMode>,

    // Connection-saturation scenario
    /// Number of concurrent tagged sessions to hold open.
    pub active_conn_target: usize,
    /// How long each session runs its blocking hold statement.
    pub active_conn_hold: Duration,
    /// Delay between launching workers and opening the start gate.
    pub gate_grace: Duration,
    /// How long a connected worker waits for the gate before giving up.
    pub gate_timeout: Duration,

    // Polling
    pub wait_timeout: Duration,
    pub poll_interval: Duration,

    // Artifacts
    pub view_mode: ViewMode,
    pub repo_root: PathBuf,
    pub psql_bin: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            ssl_mode: None,
            active_conn_target: 52,
            active_conn_hold: Duration::from_secs(20),
            gate_grace: Duration::from_secs(2),
            gate_timeout: Duration::from_secs(15),
            wait_timeout: Duration::from_secs(45),
            poll_interval: Duration::from_millis(500),
            view_mode: ViewMode::Both,
            repo_root: PathBuf::from("."),
            psql_bin: PathBuf::from("psql"),
        }
    }
}

impl std::fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("active_conn_target", &self.active_conn_target)
            .field("active_conn_hold", &self.active_conn_hold)
            .field("gate_grace", &self.gate_grace)
            .field("gate_timeout", &self.gate_timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("view_mode", &self.view_mode)
            .field("repo_root", &self.repo_root)
            .field("psql_bin", &self.psql_bin)
            .finish()
    }
}

impl HarnessConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // Connection
        if let Some(v) = get("PGHOST") {
            config.host = v;
        }
        config.port = parse_number(&get, "PGPORT", config.port)?;
        if let Some(v) = get("PGUSER") {
            config.user = v;
        }
        config.password = get("PGPASSWORD");
        if let Some(v) = get("PGDATABASE") {
            config.database = v;
        }
        if let Some(v) = get("PGSSLMODE") {
            config.ssl_mode = Some(SslMode::parse(&v).ok_or(Error::InvalidConfig {
                key: "PGSSLMODE",
                value: v,
                reason: "expected disable, allow, prefer, require, verify-ca or verify-full",
            })?);
        }

        // Connection-saturation scenario
        config.active_conn_target = parse_number(
            &get,
            "PGFA_TEST_ACTIVE_CONN_TARGET",
            config.active_conn_target,
        )?;
        if config.active_conn_target == 0 {
            return Err(Error::InvalidConfig {
                key: "PGFA_TEST_ACTIVE_CONN_TARGET",
                value: "0".to_string(),
                reason: "at least one worker is required",
            });
        }
        config.active_conn_hold = Duration::from_secs(parse_number(
            &get,
            "PGFA_TEST_ACTIVE_CONN_SLEEP_SECONDS",
            config.active_conn_hold.as_secs(),
        )?);
        config.gate_grace = Duration::from_millis(parse_number(
            &get,
            "PGFA_TEST_GATE_GRACE_MS",
            duration_millis(config.gate_grace),
        )?);
        config.gate_timeout = Duration::from_secs(parse_number(
            &get,
            "PGFA_TEST_GATE_TIMEOUT_SECONDS",
            config.gate_timeout.as_secs(),
        )?);

        // Polling
        config.wait_timeout = Duration::from_secs(parse_number(
            &get,
            "PGFA_TEST_WAIT_TIMEOUT_SECONDS",
            config.wait_timeout.as_secs(),
        )?);
        config.poll_interval = Duration::from_millis(parse_number(
            &get,
            "PGFA_TEST_POLL_INTERVAL_MS",
            duration_millis(config.poll_interval),
        )?);

        // Artifacts
        if let Some(v) = get("PGFA_TEST_VIEW_MODE") {
            config.view_mode = ViewMode::parse(&v);
        }
        if let Some(v) = get("PGFA_REPO_ROOT") {
            config.repo_root = PathBuf::from(v);
        }
        if let Some(v) = get("PGFA_PSQL_BIN") {
            config.psql_bin = PathBuf::from(v);
        }

        tracing::debug!(config = ?config, "harness configuration resolved");
        Ok(config)
    }

    /// Repository layout rooted at [`HarnessConfig::repo_root`].
    #[must_use]
    pub fn layout(&self) -> crate::layout::RepoLayout {
        crate::layout::RepoLayout::new(&self.repo_root)
    }

    /// Redacted, serializable snapshot for `config` output.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "user": self.user,
            "password": self.password.as_ref().map(|_| "[REDACTED]"),
            "database": self.database,
            "ssl_mode": self.ssl_mode,
            "active_conn_target": self.active_conn_target,
            "active_conn_hold_seconds": self.active_conn_hold.as_secs(),
            "gate_grace_ms": duration_millis(self.gate_grace),
            "gate_timeout_seconds": self.gate_timeout.as_secs(),
            "wait_timeout_seconds": self.wait_timeout.as_secs(),
            "poll_interval_ms": duration_millis(self.poll_interval),
            "view_mode": self.view_mode,
            "repo_root": self.repo_root.display().to_string(),
            "psql_bin": self.psql_bin.display().to_string(),
        })
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_number<T, F>(get: &F, key: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| Error::InvalidConfig {
            key,
            value: v,
            reason: "expected a non-negative integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<HarnessConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HarnessConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "postgres");
        assert_eq!(config.password, None);
        assert_eq!(config.database, "postgres");
        assert_eq!(config.ssl_mode, None);
        assert_eq!(config.active_conn_target, 52);
        assert_eq!(config.active_conn_hold, Duration::from_secs(20));
        assert_eq!(config.wait_timeout, Duration::from_secs(45));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.view_mode, ViewMode::Both);
        assert_eq!(config.psql_bin, PathBuf::from("psql"));
    }

    #[test]
    fn environment_overrides_every_field() {
        let config = config_from(&[
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("PGUSER", "auditor"),
            ("PGPASSWORD", "hunter2"),
            ("PGDATABASE", "firstaid"),
            ("PGSSLMODE", "verify-full"),
            ("PGFA_TEST_ACTIVE_CONN_TARGET", "8"),
            ("PGFA_TEST_ACTIVE_CONN_SLEEP_SECONDS", "3"),
            ("PGFA_TEST_WAIT_TIMEOUT_SECONDS", "10"),
            ("PGFA_TEST_POLL_INTERVAL_MS", "250"),
            ("PGFA_TEST_GATE_GRACE_MS", "100"),
            ("PGFA_TEST_GATE_TIMEOUT_SECONDS", "4"),
            ("PGFA_TEST_VIEW_MODE", "managed"),
            ("PGFA_REPO_ROOT", "/srv/pgFirstAid"),
            ("PGFA_PSQL_BIN", "/usr/lib/postgresql/16/bin/psql"),
        ])
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.user, "auditor");
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.database, "firstaid");
        assert_eq!(config.ssl_mode, Some(SslMode::VerifyFull));
        assert_eq!(config.active_conn_target, 8);
        assert_eq!(config.active_conn_hold, Duration::from_secs(3));
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.gate_grace, Duration::from_millis(100));
        assert_eq!(config.gate_timeout, Duration::from_secs(4));
        assert_eq!(config.view_mode, ViewMode::Managed);
        assert_eq!(config.repo_root, PathBuf::from("/srv/pgFirstAid"));
        assert_eq!(
            config.psql_bin,
            PathBuf::from("/usr/lib/postgresql/16/bin/psql")
        );
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("PGPASSWORD", ""), ("PGSSLMODE", "  "), ("PGPORT", "")])
            .unwrap();
        assert_eq!(config.password, None);
        assert_eq!(config.ssl_mode, None);
        assert_eq!(config.port, 5432);
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let err = config_from(&[("PGPORT", "fifty")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "PGPORT", .. }));

        let err = config_from(&[("PGFA_TEST_WAIT_TIMEOUT_SECONDS", "-1")]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfig {
                key: "PGFA_TEST_WAIT_TIMEOUT_SECONDS",
                ..
            }
        ));
    }

    #[test]
    fn zero_worker_target_is_rejected() {
        let err = config_from(&[("PGFA_TEST_ACTIVE_CONN_TARGET", "0")]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidConfig {
                key: "PGFA_TEST_ACTIVE_CONN_TARGET",
                ..
            }
        ));
    }

    #[test]
    fn unknown_ssl_mode_is_rejected() {
        let err = config_from(&[("PGSSLMODE", "mandatory")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "PGSSLMODE", .. }));
    }

    #[test]
    fn view_mode_parsing() {
        assert_eq!(ViewMode::parse("both"), ViewMode::Both);
        assert_eq!(ViewMode::parse(" Managed "), ViewMode::Managed);
        assert_eq!(ViewMode::parse("self_hosted"), ViewMode::SelfHosted);
        assert_eq!(ViewMode::parse("self-hosted"), ViewMode::SelfHosted);
        assert_eq!(ViewMode::parse("rds"), ViewMode::Both);
    }

    #[test]
    fn ssl_mode_round_trips_libpq_spelling() {
        for mode in [
            SslMode::Disable,
            SslMode::Allow,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(SslMode::parse(mode.as_str()), Some(mode));
        }
        assert!(SslMode::VerifyCa.verifies_certificate());
        assert!(!SslMode::VerifyCa.verifies_hostname());
        assert!(!SslMode::Require.verifies_certificate());
    }

    #[test]
    fn debug_and_summary_redact_password() {
        let config = config_from(&[("PGPASSWORD", "hunter2")]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));

        let summary = config.summary().to_string();
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("[REDACTED]"));
    }
}
