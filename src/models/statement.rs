//! Statement and statement-source models.

use std::fmt;
use std::path::{Path, PathBuf};

/// A fully substituted, ready-to-execute SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement(String);

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Statement {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where the template text of a statement comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementSource {
    /// SQL template text given directly.
    Inline(String),
    /// Path to a file holding the SQL template text (UTF-8).
    File(PathBuf),
}

impl StatementSource {
    /// Treat `source` as a file path when such a file exists, as inline SQL otherwise.
    pub fn detect(source: &str) -> Self {
        let path = Path::new(source);
        if path.is_file() {
            Self::File(path.to_path_buf())
        } else {
            Self::Inline(source.to_string())
        }
    }

    pub fn inline(sql: impl Into<String>) -> Self {
        Self::Inline(sql.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}
