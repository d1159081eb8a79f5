//! Check-name sets and bidirectional parity reports.
//!
//! Two textual surfaces carry check names in SQL source:
//! - producers: `'Outdated Statistics' AS check_name`
//! - verifiers: `WHERE check_name = 'Outdated Statistics'`
//!
//! Extraction is a narrow pattern match, not an SQL parse. Comparison always
//! computes both directions of the set difference.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::ViewMode;
use crate::error::{Error, Result};
use crate::layout::{RepoLayout, display_name, read_artifact};

static PRODUCER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)'([^']+)'\s+as\s+check_name").expect("producer check_name regex")
});

static VERIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)check_name\s*=\s*'([^']+)'").expect("verifier check_name regex")
});

/// Ordered set of check names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CheckNameSet(BTreeSet<String>);

impl CheckNameSet {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Names in `self` but not in `other`, sorted.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Vec<String> {
        self.0.difference(&other.0).cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for CheckNameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for CheckNameSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

fn capture_all(re: &Regex, sql: &str) -> CheckNameSet {
    re.captures_iter(sql)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Check names produced by a literal aliased `AS check_name`.
#[must_use]
pub fn extract_from_source(sql: &str) -> CheckNameSet {
    capture_all(&PRODUCER_RE, sql)
}

/// Check names referenced by a `check_name = '<literal>'` filter.
#[must_use]
pub fn extract_from_pgtap(sql: &str) -> CheckNameSet {
    capture_all(&VERIFIER_RE, sql)
}

/// Producer-side names from an SQL file.
pub fn source_file_check_names(path: &Path) -> Result<CheckNameSet> {
    Ok(extract_from_source(&read_artifact(path)?))
}

/// Union of verifier-side names over every numbered pgTAP file.
pub fn pgtap_check_names(layout: &RepoLayout) -> Result<CheckNameSet> {
    let mut names = CheckNameSet::new();
    for file in layout.pgtap_files()? {
        names.extend(extract_from_pgtap(&read_artifact(&file)?).0);
    }
    Ok(names)
}

/// Both directions of the difference between two labelled sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityReport {
    pub left: String,
    pub right: String,
    /// In `left`, absent from `right`.
    pub missing_in_right: Vec<String>,
    /// In `right`, absent from `left`.
    pub extra_in_right: Vec<String>,
}

impl ParityReport {
    #[must_use]
    pub fn compare(
        left: impl Into<String>,
        left_set: &CheckNameSet,
        right: impl Into<String>,
        right_set: &CheckNameSet,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            missing_in_right: left_set.difference(right_set),
            extra_in_right: right_set.difference(left_set),
        }
    }

    /// Build from differences already computed elsewhere (e.g. server-side
    /// `EXCEPT`). Both lists are sorted.
    #[must_use]
    pub fn from_differences(
        left: impl Into<String>,
        right: impl Into<String>,
        mut missing_in_right: Vec<String>,
        mut extra_in_right: Vec<String>,
    ) -> Self {
        missing_in_right.sort();
        extra_in_right.sort();
        Self {
            left: left.into(),
            right: right.into(),
            missing_in_right,
            extra_in_right,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing_in_right.is_empty() && self.extra_in_right.is_empty()
    }

    /// `Err(ParityMismatch)` naming every offending identifier when either
    /// direction is non-empty.
    pub fn ensure(&self) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }
        Err(Error::ParityMismatch {
            left: self.left.clone(),
            right: self.right.clone(),
            missing_in_right: self.missing_in_right.clone(),
            extra_in_right: self.extra_in_right.clone(),
        })
    }
}

/// Source check names versus pgTAP coverage.
pub fn pgtap_coverage(layout: &RepoLayout) -> Result<ParityReport> {
    let source_path = layout.source_sql();
    let source = source_file_check_names(&source_path)?;
    let covered = pgtap_check_names(layout)?;
    Ok(ParityReport::compare(
        display_name(&source_path),
        &source,
        "pgTAP suite",
        &covered,
    ))
}

/// Source check names versus each view file selected by `mode`.
pub fn view_file_coverage(layout: &RepoLayout, mode: ViewMode) -> Result<Vec<ParityReport>> {
    let source_path = layout.source_sql();
    let source = source_file_check_names(&source_path)?;
    let source_label = display_name(&source_path);
    layout
        .view_files(mode)
        .iter()
        .map(|view| {
            let names = source_file_check_names(view)?;
            Ok(ParityReport::compare(
                source_label.clone(),
                &source,
                display_name(view),
                &names,
            ))
        })
        .collect()
}

/// Self-hosted view file versus managed view file.
pub fn view_variant_file_parity(layout: &RepoLayout) -> Result<ParityReport> {
    let self_hosted = layout.self_hosted_view_sql();
    let managed = layout.managed_view_sql();
    Ok(ParityReport::compare(
        display_name(&self_hosted),
        &source_file_check_names(&self_hosted)?,
        display_name(&managed),
        &source_file_check_names(&managed)?,
    ))
}
