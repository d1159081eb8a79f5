//! Allow-listed identifier interpolation.
//!
//! Values always travel as bind parameters. Schema, table, and artifact
//! names cannot, so they go through [`SqlIdent`], which accepts only plain
//! unquoted identifiers. Rendered names are left unquoted so the server
//! folds case exactly as it did when the object was created.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DbError, DbResult};

/// PostgreSQL truncates identifiers beyond `NAMEDATALEN - 1` bytes.
const MAX_IDENT_LEN: usize = 63;

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// A validated schema/table/function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        if name.len() > MAX_IDENT_LEN || !IDENT_RE.is_match(&name) {
            return Err(DbError::InvalidIdentifier(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `schema.name`
    #[must_use]
    pub fn qualify(&self, name: &Self) -> String {
        format!("{}.{}", self.0, name.0)
    }

    /// Folded form as stored in the catalogs (`pg_stat_*`, `pg_namespace`).
    #[must_use]
    pub fn catalog_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
