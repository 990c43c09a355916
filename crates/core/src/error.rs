//! Error types for migration graph extraction and export

use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ExtractError;

pub type Result<T> = std::result::Result<T, MigraphError>;

#[derive(Debug, Error)]
pub enum MigraphError {
    /// The project root handed to the locator does not exist
    #[error("path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// A migration path without a `<component>/migrations/` parent chain
    #[error("not a migration path (expected <component>/migrations/<name>.py): {}", path.display())]
    MalformedPath { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    /// The rendering sink failed (missing `dot`, bad exit status, viewer)
    #[error("failed to render {}: {message}", path.display())]
    Render { path: PathBuf, message: String },

    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("failed to load Python grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl MigraphError {
    /// Path of the file or directory the error is about, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            MigraphError::PathNotFound { path }
            | MigraphError::MalformedPath { path }
            | MigraphError::Io { path, .. }
            | MigraphError::Parse { path, .. }
            | MigraphError::Render { path, .. } => Some(path),
            MigraphError::UnknownFormat(_)
            | MigraphError::Grammar(_)
            | MigraphError::Pattern(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = MigraphError::PathNotFound {
            path: PathBuf::from("/no/such/project"),
        };
        assert_eq!(err.to_string(), "path not found: /no/such/project");
        assert_eq!(err.path(), Some(std::path::Path::new("/no/such/project")));

        let err = MigraphError::Parse {
            path: PathBuf::from("blog/migrations/0001_initial.py"),
            source: ExtractError::Syntax { line: 3, column: 7 },
        };
        assert_eq!(
            err.to_string(),
            "failed to parse blog/migrations/0001_initial.py: invalid syntax at line 3, column 7"
        );
    }

    #[test]
    fn test_unknown_format_has_no_path() {
        let err = MigraphError::UnknownFormat("bogus".to_string());
        assert!(err.path().is_none());
        assert_eq!(err.to_string(), "unknown output format: bogus");
    }
}
