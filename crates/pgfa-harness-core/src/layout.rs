//! Locations of the SQL artifacts the harness drives.
//!
//! ```text
//! {repo_root}/
//!   pgFirstAid.sql                  canonical callable
//!   view_pgFirstAid.sql             self-hosted view variant
//!   view_pgFirstAid_managed.sql     managed-service view variant
//!   testing/pgTAP/00_setup.sql
//!   testing/pgTAP/0[1-9]_*.sql      numbered verification suite
//!   testing/pgTAP/99_teardown.sql
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ViewMode;
use crate::error::{Error, Result};

pub const SOURCE_SQL: &str = "pgFirstAid.sql";
pub const SELF_HOSTED_VIEW_SQL: &str = "view_pgFirstAid.sql";
pub const MANAGED_VIEW_SQL: &str = "view_pgFirstAid_managed.sql";
pub const PGTAP_DIR: &str = "testing/pgTAP";
pub const SETUP_SQL: &str = "00_setup.sql";
pub const TEARDOWN_SQL: &str = "99_teardown.sql";
pub const PGTAP_SUITE_PATTERN: &str = "0[1-9]_*.sql";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn source_sql(&self) -> PathBuf {
        self.root.join(SOURCE_SQL)
    }

    #[must_use]
    pub fn self_hosted_view_sql(&self) -> PathBuf {
        self.root.join(SELF_HOSTED_VIEW_SQL)
    }

    #[must_use]
    pub fn managed_view_sql(&self) -> PathBuf {
        self.root.join(MANAGED_VIEW_SQL)
    }

    #[must_use]
    pub fn pgtap_dir(&self) -> PathBuf {
        self.root.join(PGTAP_DIR)
    }

    #[must_use]
    pub fn setup_sql(&self) -> PathBuf {
        self.pgtap_dir().join(SETUP_SQL)
    }

    #[must_use]
    pub fn teardown_sql(&self) -> PathBuf {
        self.pgtap_dir().join(TEARDOWN_SQL)
    }

    /// Numbered pgTAP files, sorted by file name. Setup and teardown
    /// (`00_`, `99_`) are excluded by the pattern.
    pub fn pgtap_files(&self) -> Result<Vec<PathBuf>> {
        let dir = glob::Pattern::escape(&self.pgtap_dir().to_string_lossy());
        let pattern = format!("{dir}/{PGTAP_SUITE_PATTERN}");
        let mut files: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(std::result::Result::ok)
            .filter(|p| p.is_file())
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// View files selected by `mode`.
    #[must_use]
    pub fn view_files(&self, mode: ViewMode) -> Vec<PathBuf> {
        match mode {
            ViewMode::Both => vec![self.self_hosted_view_sql(), self.managed_view_sql()],
            ViewMode::Managed => vec![self.managed_view_sql()],
            ViewMode::SelfHosted => vec![self.self_hosted_view_sql()],
        }
    }

    /// The view installed before pgTAP runs and restored after variant checks.
    #[must_use]
    pub fn default_view_file(&self, mode: ViewMode) -> PathBuf {
        match mode {
            ViewMode::Managed => self.managed_view_sql(),
            ViewMode::Both | ViewMode::SelfHosted => self.self_hosted_view_sql(),
        }
    }
}

/// Read an SQL artifact as UTF-8, attaching the path to any failure.
pub fn read_artifact(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::ReadArtifact {
        path: path.to_path_buf(),
        source,
    })
}

/// File name for messages, falling back to the full path.
#[must_use]
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "-- sql\n").unwrap();
    }

    #[test]
    fn pgtap_files_are_sorted_and_exclude_setup_and_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        for name in [
            "00_setup.sql",
            "03_indexes.sql",
            "01_basics.sql",
            "02_tables.sql",
            "99_teardown.sql",
            "10_not_numbered_suite.sql",
            "notes.md",
        ] {
            touch(&layout.pgtap_dir().join(name));
        }

        let names: Vec<String> = layout
            .pgtap_files()
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(names, ["01_basics.sql", "02_tables.sql", "03_indexes.sql"]);
    }

    #[test]
    fn pgtap_files_empty_when_directory_missing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        assert!(layout.pgtap_files().unwrap().is_empty());
    }

    #[test]
    fn view_file_selection_follows_mode() {
        let layout = RepoLayout::new("/repo");
        assert_eq!(
            layout.view_files(ViewMode::Both),
            vec![
                PathBuf::from("/repo/view_pgFirstAid.sql"),
                PathBuf::from("/repo/view_pgFirstAid_managed.sql"),
            ]
        );
        assert_eq!(
            layout.view_files(ViewMode::Managed),
            vec![PathBuf::from("/repo/view_pgFirstAid_managed.sql")]
        );
        assert_eq!(
            layout.view_files(ViewMode::SelfHosted),
            vec![PathBuf::from("/repo/view_pgFirstAid.sql")]
        );
    }

    #[test]
    fn default_view_is_managed_only_in_managed_mode() {
        let layout = RepoLayout::new("/repo");
        assert_eq!(
            layout.default_view_file(ViewMode::Managed),
            PathBuf::from("/repo/view_pgFirstAid_managed.sql")
        );
        assert_eq!(
            layout.default_view_file(ViewMode::Both),
            PathBuf::from("/repo/view_pgFirstAid.sql")
        );
        assert_eq!(
            layout.default_view_file(ViewMode::SelfHosted),
            PathBuf::from("/repo/view_pgFirstAid.sql")
        );
    }

    #[test]
    fn read_artifact_reports_path_on_failure() {
        let err = read_artifact(Path::new("/definitely/not/here.sql")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.sql"));
    }
}
