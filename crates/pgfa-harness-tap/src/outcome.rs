//! TAP output classification.
//!
//! Only the line-oriented markers matter: `not ok N` anywhere in the
//! combined stdout/stderr fails the script even when `psql` exits 0, since
//! pgTAP reports assertion failures as output rather than as SQL errors.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{TapError, TapResult};

static FAILURE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*not ok\s+\d+").expect("failure line regex"));

static PASS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*ok\s+\d+").expect("pass line regex"));

/// Every line that reports a failed assertion, in output order.
#[must_use]
pub fn tap_failures(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| FAILURE_LINE_RE.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Number of `ok N` lines.
#[must_use]
pub fn tap_passes(output: &str) -> usize {
    output.lines().filter(|line| PASS_LINE_RE.is_match(line)).count()
}

/// Result of running one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TapOutcome {
    /// Script file name.
    pub script: String,
    /// Process exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    /// `stdout`, a newline, then `stderr`, trimmed.
    pub output: String,
    pub failures: Vec<String>,
    pub assertions_passed: usize,
    pub duration_ms: u64,
}

impl TapOutcome {
    #[must_use]
    pub fn new(
        script: impl Into<String>,
        exit_code: i32,
        output: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            script: script.into(),
            exit_code,
            failures: tap_failures(&output),
            assertions_passed: tap_passes(&output),
            output,
            duration_ms,
        }
    }

    /// Join captured streams the way they are reported.
    #[must_use]
    pub fn combine_streams(stdout: &[u8], stderr: &[u8]) -> String {
        format!(
            "{}\n{}",
            String::from_utf8_lossy(stdout),
            String::from_utf8_lossy(stderr)
        )
        .trim()
        .to_string()
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && self.failures.is_empty()
    }

    /// Exit status is checked first, then failure lines.
    pub fn into_result(self) -> TapResult<Self> {
        if self.exit_code != 0 {
            return Err(TapError::NonZeroExit {
                script: self.script,
                exit_code: self.exit_code,
                output: self.output,
            });
        }
        if !self.failures.is_empty() {
            return Err(TapError::AssertionsFailed {
                script: self.script,
                failures: self.failures,
                output: self.output,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "\
1..4
ok 1 - has table
not ok 2 - Outdated Statistics reported
#   Failed test 2: \"Outdated Statistics reported\"
  not ok 3 - indented failure
ok 4 - has view
# Looks like you failed 2 tests of 4";

    #[test]
    fn finds_failure_lines_in_order() {
        assert_eq!(
            tap_failures(MIXED),
            vec![
                "not ok 2 - Outdated Statistics reported".to_string(),
                "  not ok 3 - indented failure".to_string(),
            ]
        );
        assert_eq!(tap_passes(MIXED), 2);
    }

    #[test]
    fn ignores_lines_that_only_mention_not_ok() {
        let output = "# diagnostic: this is not ok 5\nnot okay 1\nnot ok\n  ok 1";
        assert!(tap_failures(output).is_empty());
        assert_eq!(tap_passes(output), 1);
    }

    #[test]
    fn zero_exit_without_markers_passes() {
        let outcome = TapOutcome::new("01_a.sql", 0, "1..1\nok 1 - fine".into(), 5);
        assert!(outcome.passed());
        assert_eq!(outcome.clone().into_result().unwrap(), outcome);
    }

    #[test]
    fn zero_exit_with_markers_fails() {
        let outcome = TapOutcome::new("01_a.sql", 0, MIXED.into(), 5);
        assert!(!outcome.passed());
        match outcome.into_result() {
            Err(TapError::AssertionsFailed { failures, output, .. }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(output, MIXED);
            }
            other => panic!("expected assertion failure, got {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_fails_even_without_markers() {
        let outcome = TapOutcome::new("02_b.sql", 3, "psql: error: boom".into(), 5);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.passed());
        assert!(matches!(
            outcome.into_result(),
            Err(TapError::NonZeroExit { exit_code: 3, .. })
        ));
    }

    #[test]
    fn streams_are_joined_then_trimmed() {
        assert_eq!(TapOutcome::combine_streams(b"ok 1\n", b""), "ok 1");
        assert_eq!(
            TapOutcome::combine_streams(b"ok 1", b"NOTICE: x\n"),
            "ok 1\nNOTICE: x"
        );
        assert_eq!(TapOutcome::combine_streams(b"", b""), "");
    }
}
