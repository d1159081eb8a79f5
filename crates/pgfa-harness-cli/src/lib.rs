//! CLI for the pgFirstAid integration harness (`pgfa-harness` binary)
//!
//! Each subcommand is one harness flow. Exit codes:
//! - 0: flow passed
//! - 1: flow failed (finding missing, parity broken, pgTAP failure, database error)
//! - 2: usage or configuration error
//! - 3: scenario skipped because the environment could not produce its conditions

#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pgfa_harness_core::{
    HarnessConfig, HarnessError, ParityReport, ViewMode, pgtap_coverage, view_file_coverage,
    view_variant_file_parity,
};
use pgfa_harness_db::{
    ConnectOptions, DbConnection, DbError, DiagnosticArtifact, PollSettings, PreparedDatabase,
    ScenarioOutcome, TestSchema, connect, high_connection_count, install_default_view,
    live_parity, outdated_statistics, view_variant_parity,
};
use pgfa_harness_tap::{PsqlRunner, RunReport, TapError};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_SKIPPED: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] HarnessError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Tap(#[from] TapError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
    #[error("skipped: {0}")]
    Skipped(String),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(HarnessError::InvalidConfig { .. }) => EXIT_USAGE,
            Self::Skipped(_) => EXIT_SKIPPED,
            _ => EXIT_FAILED,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pgfa-harness", version, about = "pgFirstAid integration harness")]
pub struct Cli {
    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Repository checkout holding the SQL artifacts (overrides `PGFA_REPO_ROOT`).
    #[arg(long, global = true)]
    pub repo_root: Option<PathBuf>,
    /// View variant(s) to target (overrides `PGFA_TEST_VIEW_MODE`).
    #[arg(long, global = true)]
    pub view_mode: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Print the resolved configuration (password redacted).
    Config,
    /// Check check_name coverage across the SQL files without a database.
    Coverage,
    /// Compare live check names of pg_firstAid() and v_pgfirstaid per view variant.
    Parity,
    /// Run the numbered pgTAP suite through psql.
    Tap,
    /// Create stale planner statistics and expect both artifacts to flag them.
    StaleStats,
    /// Saturate tagged active sessions and expect a High Connection Count finding.
    Connections,
}

pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match execute(&cli) {
        Ok(()) => 0,
        Err(err) => {
            match &err {
                CliError::Skipped(reason) => eprintln!("SKIP: {reason}"),
                other => eprintln!("error: {other}"),
            }
            err.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Environment first, then command-line overrides.
pub fn resolve_config(cli: &Cli) -> CliResult<HarnessConfig> {
    let mut config = HarnessConfig::from_env()?;
    if let Some(root) = &cli.repo_root {
        config.repo_root.clone_from(root);
    }
    if let Some(mode) = &cli.view_mode {
        config.view_mode = ViewMode::parse(mode);
    }
    Ok(config)
}

pub fn execute(cli: &Cli) -> CliResult<()> {
    let config = resolve_config(cli)?;
    tracing::debug!(?config, command = ?cli.command, "resolved configuration");
    match cli.command {
        Commands::Config => handle_config(&config, cli.json),
        Commands::Coverage => handle_coverage(&config, cli.json),
        Commands::Parity => handle_parity(&config, cli.json),
        Commands::Tap => handle_tap(&config, cli.json),
        Commands::StaleStats => handle_stale_stats(&config, cli.json),
        Commands::Connections => handle_connections(&config, cli.json),
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_config(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let summary = config.summary();
    if json {
        return print_json(&summary);
    }
    if let Some(fields) = summary.as_object() {
        for (key, value) in fields {
            println!("{key:<28} {value}");
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// Parity reporting
// ──────────────────────────────────────────────────────────────────────────────

#[must_use]
pub fn format_parity(report: &ParityReport) -> String {
    if report.is_clean() {
        return format!("ok      {} == {}", report.left, report.right);
    }
    let mut s = format!("MISMATCH {} vs {}", report.left, report.right);
    if !report.missing_in_right.is_empty() {
        s.push_str(&format!(
            "\n  missing in {}: {}",
            report.right,
            report.missing_in_right.join(", ")
        ));
    }
    if !report.extra_in_right.is_empty() {
        s.push_str(&format!(
            "\n  extra in {}: {}",
            report.right,
            report.extra_in_right.join(", ")
        ));
    }
    s
}

/// Print every report, then fail if any is unclean.
fn finish_parity(reports: &[ParityReport], json: bool) -> CliResult<()> {
    if json {
        print_json(&reports)?;
    } else {
        for report in reports {
            println!("{}", format_parity(report));
        }
    }
    let broken = reports.iter().filter(|r| !r.is_clean()).count();
    if broken == 0 {
        Ok(())
    } else {
        Err(CliError::Failed(format!(
            "{broken} of {} check_name comparisons differ",
            reports.len()
        )))
    }
}

fn handle_coverage(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let layout = config.layout();
    let mut reports = vec![pgtap_coverage(&layout)?];
    reports.extend(view_file_coverage(&layout, config.view_mode)?);
    if config.view_mode == ViewMode::Both {
        reports.push(view_variant_file_parity(&layout)?);
    }
    finish_parity(&reports, json)
}

fn session_connection(config: &HarnessConfig) -> CliResult<DbConnection> {
    Ok(connect(config, &ConnectOptions::new())?)
}

fn handle_parity(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let layout = config.layout();
    let _prepared = PreparedDatabase::prepare(config, &layout)?;
    let mut conn = session_connection(config)?;
    install_default_view(&mut conn, &layout, config.view_mode)?;

    let mut reports = vec![live_parity(
        &mut conn,
        DiagnosticArtifact::Function,
        DiagnosticArtifact::View,
    )?];
    reports.extend(view_variant_parity(&mut conn, &layout, config.view_mode)?);
    finish_parity(&reports, json)
}

/// Prepare the database, install the default view, and run every numbered
/// pgTAP script. Teardown runs before this returns.
pub fn pgtap_suite(config: &HarnessConfig) -> CliResult<RunReport> {
    let layout = config.layout();
    let _prepared = PreparedDatabase::prepare(config, &layout)?;
    {
        let mut conn = session_connection(config)?;
        install_default_view(&mut conn, &layout, config.view_mode)?;
    }
    Ok(PsqlRunner::from_config(config).run_suite(&layout)?)
}

fn handle_tap(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let report = pgtap_suite(config)?;
    if json {
        print_json(&report)?;
    } else {
        print!("{}", report.format_summary());
    }
    report.ensure()?;
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// Scenarios
// ──────────────────────────────────────────────────────────────────────────────

/// Map a scenario outcome onto the CLI result.
pub fn outcome_result(outcome: ScenarioOutcome) -> CliResult<()> {
    match outcome {
        ScenarioOutcome::Passed => Ok(()),
        ScenarioOutcome::Failed { reason } => Err(CliError::Failed(reason)),
        ScenarioOutcome::Skipped { reason, successes } => Err(CliError::Skipped(format!(
            "{reason} ({successes} load workers completed)"
        ))),
    }
}

#[derive(Serialize)]
struct ScenarioOutput<'a, T> {
    outcome: &'a ScenarioOutcome,
    report: &'a T,
}

fn finish_scenario<T: Serialize + std::fmt::Debug>(
    name: &str,
    report: &T,
    outcome: ScenarioOutcome,
    json: bool,
) -> CliResult<()> {
    if json {
        print_json(&ScenarioOutput {
            outcome: &outcome,
            report,
        })?;
    } else {
        let status = match &outcome {
            ScenarioOutcome::Passed => "PASS",
            ScenarioOutcome::Failed { .. } => "FAIL",
            ScenarioOutcome::Skipped { .. } => "SKIP",
        };
        println!("{name}: {status}");
        tracing::debug!(?report, "scenario report");
    }
    outcome_result(outcome)
}

fn handle_stale_stats(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let layout = config.layout();
    let _prepared = PreparedDatabase::prepare(config, &layout)?;
    let schema = TestSchema::create(config, TestSchema::DEFAULT_NAME)?;
    let mut conn = session_connection(config)?;
    let report = outdated_statistics(&mut conn, schema.name(), PollSettings::from_config(config))?;
    let outcome = report.outcome();
    finish_scenario("stale-stats", &report, outcome, json)
}

fn handle_connections(config: &HarnessConfig, json: bool) -> CliResult<()> {
    let layout = config.layout();
    let _prepared = PreparedDatabase::prepare(config, &layout)?;
    let mut conn = session_connection(config)?;
    let report = high_connection_count(config, &mut conn)?;
    let outcome = report.outcome();
    if outcome.is_skipped() {
        tracing::warn!(
            target_sessions = report.target,
            successes = report.successes,
            "connection scenario skipped"
        );
    }
    finish_scenario("connections", &report, outcome, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands_and_global_flags() {
        let cli = Cli::try_parse_from(["pgfa-harness", "stale-stats", "--json", "-v"]).unwrap();
        assert_eq!(cli.command, Commands::StaleStats);
        assert!(cli.json);
        assert!(cli.verbose);

        let cli = Cli::try_parse_from([
            "pgfa-harness",
            "--view-mode",
            "managed",
            "--repo-root",
            "/src/pgFirstAid",
            "parity",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Parity);
        assert_eq!(cli.view_mode.as_deref(), Some("managed"));
        assert_eq!(cli.repo_root, Some(PathBuf::from("/src/pgFirstAid")));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["pgfa-harness", "vacuum"]).is_err());
    }

    #[test]
    fn exit_codes() {
        let usage = CliError::Core(HarnessError::InvalidConfig {
            key: "PGPORT",
            value: "x".into(),
            reason: "expected a port number",
        });
        assert_eq!(usage.exit_code(), EXIT_USAGE);
        assert_eq!(CliError::Skipped("x".into()).exit_code(), EXIT_SKIPPED);
        assert_eq!(CliError::Failed("x".into()).exit_code(), EXIT_FAILED);
        let parity = CliError::Core(HarnessError::ParityMismatch {
            left: "a".into(),
            right: "b".into(),
            missing_in_right: vec![],
            extra_in_right: vec![],
        });
        assert_eq!(parity.exit_code(), EXIT_FAILED);
    }

    #[test]
    fn skip_outcome_keeps_success_count() {
        let err = outcome_result(ScenarioOutcome::Skipped {
            reason: "not enough sessions".into(),
            successes: 4,
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), EXIT_SKIPPED);
        assert_eq!(
            err.to_string(),
            "skipped: not enough sessions (4 load workers completed)"
        );
        assert!(outcome_result(ScenarioOutcome::Passed).is_ok());
    }

    #[test]
    fn parity_formatting_names_offenders() {
        let clean = ParityReport::from_differences("pg_firstAid()", "v_pgfirstaid", vec![], vec![]);
        assert_eq!(format_parity(&clean), "ok      pg_firstAid() == v_pgfirstaid");

        let broken = ParityReport::from_differences(
            "pgFirstAid.sql",
            "pgTAP suite",
            vec!["Outdated Statistics".into(), "High Connection Count".into()],
            vec!["Retired Check".into()],
        );
        let text = format_parity(&broken);
        assert!(text.starts_with("MISMATCH pgFirstAid.sql vs pgTAP suite"));
        assert!(
            text.contains("missing in pgTAP suite: High Connection Count, Outdated Statistics")
        );
        assert!(text.contains("extra in pgTAP suite: Retired Check"));
    }
}
