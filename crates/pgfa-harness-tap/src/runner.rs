//! `psql` invocation and suite execution.
//!
//! Each script runs in its own `psql -X -v ON_ERROR_STOP=1` process with
//! explicit connection flags. `PGPASSWORD` and `PGSSLMODE` are added to the
//! inherited environment only when configured.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use chrono::Utc;
use pgfa_harness_core::{HarnessConfig, RepoLayout, SslMode, display_name};
use serde::Serialize;

use crate::error::{TapError, TapResult};
use crate::outcome::TapOutcome;

/// Runs SQL scripts through the `psql` client.
#[derive(Clone)]
pub struct PsqlRunner {
    binary: PathBuf,
    host: String,
    port: u16,
    user: String,
    database: String,
    password: Option<String>,
    ssl_mode: Option<SslMode>,
}

impl std::fmt::Debug for PsqlRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PsqlRunner")
            .field("binary", &self.binary)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl PsqlRunner {
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            binary: config.psql_bin.clone(),
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            database: config.database.clone(),
            password: config.password.clone(),
            ssl_mode: config.ssl_mode,
        }
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The process that would run `script`, with output piped.
    #[must_use]
    pub fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-X")
            .args(["-v", "ON_ERROR_STOP=1"])
            .arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(&self.user)
            .arg("-d")
            .arg(&self.database)
            .arg("-f")
            .arg(script);
        if let Some(password) = &self.password {
            cmd.env("PGPASSWORD", password);
        }
        if let Some(mode) = self.ssl_mode {
            cmd.env("PGSSLMODE", mode.as_str());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Run one script. Only a launch failure is an `Err`; a failing script
    /// is an `Ok` outcome whose [`TapOutcome::passed`] is false.
    pub fn run(&self, script: &Path) -> TapResult<TapOutcome> {
        let name = display_name(script);
        let start = Instant::now();
        let output = self
            .command(script)
            .output()
            .map_err(|source| TapError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = TapOutcome::new(
            name,
            output.status.code().unwrap_or(-1),
            TapOutcome::combine_streams(&output.stdout, &output.stderr),
            elapsed_ms,
        );
        if outcome.passed() {
            tracing::info!(
                script = %outcome.script,
                assertions = outcome.assertions_passed,
                duration_ms = outcome.duration_ms,
                "pgTAP script passed"
            );
        } else {
            tracing::warn!(
                script = %outcome.script,
                exit_code = outcome.exit_code,
                failures = outcome.failures.len(),
                "pgTAP script failed"
            );
        }
        Ok(outcome)
    }

    /// Run every numbered script in file-name order. Scripts keep running
    /// after a failure so the report covers the whole suite.
    pub fn run_suite(&self, layout: &RepoLayout) -> TapResult<RunReport> {
        let scripts = layout.pgtap_files()?;
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scripts.len());
        for script in &scripts {
            results.push(self.run(script)?);
        }
        Ok(RunReport::new(
            results,
            started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        ))
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Run Report
// ──────────────────────────────────────────────────────────────────────────────

/// Summary of a suite run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// RFC3339.
    pub started_at: String,
    /// RFC3339.
    pub ended_at: String,
    pub results: Vec<TapOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        results: Vec<TapOutcome>,
        started_at: String,
        ended_at: String,
        duration_ms: u64,
    ) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            started_at,
            ended_at,
            results,
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0
    }

    /// The first failing script as an error carrying its full output.
    pub fn ensure(&self) -> TapResult<()> {
        self.results
            .iter()
            .find(|r| !r.passed())
            .map_or(Ok(()), |r| r.clone().into_result().map(|_| ()))
    }

    #[must_use]
    pub fn format_summary(&self) -> String {
        let status = if self.success() { "PASS" } else { "FAIL" };
        let mut s = format!("\n{}\n", "═".repeat(60));
        let _ = writeln!(
            s,
            "  pgTAP: {status}  |  {} scripts  |  {}ms",
            self.total, self.duration_ms
        );
        let _ = writeln!(s, "  Passed: {}  |  Failed: {}", self.passed, self.failed);
        let _ = writeln!(s, "{}", "═".repeat(60));

        if self.failed > 0 {
            s.push_str("\nFailed scripts:\n");
            for result in self.results.iter().filter(|r| !r.passed()) {
                let _ = writeln!(s, "  - {} (exit {})", result.script, result.exit_code);
                for line in &result.failures {
                    let _ = writeln!(s, "      {}", line.trim());
                }
            }
        }
        s
    }
}
