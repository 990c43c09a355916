//! Dependency extraction from migration source files
//!
//! Django migrations declare their dependencies as a class attribute:
//!
//! ```text
//! class Migration(migrations.Migration):
//!     dependencies = [
//!         ("auth", "0001_initial"),
//!         migrations.swappable_dependency(settings.AUTH_USER_MODEL),
//!     ]
//! ```
//!
//! The file is never executed. It is parsed with tree-sitter and the
//! declaration is read off the syntax tree; see [`python`] for the walk.
//!
//! # Parse failures
//!
//! tree-sitter always produces a tree, inserting ERROR/MISSING nodes where
//! the input is invalid. Such a tree is reported as
//! [`ExtractError::Syntax`] rather than searched, so that an unreadable file
//! is never confused with a file that declares no dependencies.

use std::path::Path;

use thiserror::Error;
use tracing::debug;
use tree_sitter::Parser as TsParser;
use tree_sitter_python::LANGUAGE;

use crate::error::{MigraphError, Result};
use crate::migration::MigrationId;

pub mod python;

pub use python::{Declaration, SkippedEntry};

/// Reasons a source text could not be searched for dependencies
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to load Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("parser produced no syntax tree")]
    NoTree,

    /// 1-based position of the first invalid token
    #[error("invalid syntax at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
}

/// Reusable dependency extractor
///
/// Holds one tree-sitter parser for the whole run.
pub struct DependencyExtractor {
    parser: TsParser,
}

impl DependencyExtractor {
    /// Create an extractor with the Python grammar loaded
    pub fn new() -> std::result::Result<Self, tree_sitter::LanguageError> {
        let mut parser = TsParser::new();
        parser.set_language(&LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Extract the declared dependencies from one file's text
    ///
    /// # Returns
    /// The (component, migration) pairs in source order. Empty if the text
    /// has no `Migration` class or the class has no `dependencies`.
    ///
    /// # Errors
    /// [`ExtractError::Syntax`] if the text is not valid Python.
    pub fn extract(&mut self, source: &str) -> std::result::Result<Vec<MigrationId>, ExtractError> {
        self.declaration(source).map(|declaration| declaration.dependencies)
    }

    /// Like [`extract`](Self::extract), also returning the entries that
    /// were not 2-tuples of string literals
    pub fn declaration(&mut self, source: &str) -> std::result::Result<Declaration, ExtractError> {
        let tree = self.parser.parse(source, None).ok_or(ExtractError::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let (line, column) = python::first_error_position(&root)
                .unwrap_or((root.start_position().row + 1, root.start_position().column + 1));
            return Err(ExtractError::Syntax { line, column });
        }

        Ok(python::extract_dependencies(&root, source.as_bytes()))
    }

    /// Read a migration file and extract its dependencies
    ///
    /// # Errors
    /// [`MigraphError::Io`] if the file cannot be read,
    /// [`MigraphError::Parse`] if it is not valid Python.
    pub fn extract_file(&mut self, path: &Path) -> Result<Vec<MigrationId>> {
        debug!("Start processing of {}", path.display());

        let source = std::fs::read_to_string(path).map_err(|source| MigraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let Declaration {
            dependencies,
            skipped,
        } = self.declaration(&source).map_err(|source| MigraphError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        for entry in &skipped {
            debug!(
                "{}:{}: skipping dependency entry {}",
                path.display(),
                entry.line,
                entry.text
            );
        }
        if !skipped.is_empty() {
            debug!(
                "Skipped {} dependency entries in {}",
                skipped.len(),
                path.display()
            );
        }

        debug!(
            "Dependencies of {}: [{}]",
            path.display(),
            dependencies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(dependencies)
    }
}

/// One-shot convenience wrapper around [`DependencyExtractor::extract`]
pub fn extract_dependencies(source: &str) -> std::result::Result<Vec<MigrationId>, ExtractError> {
    DependencyExtractor::new()?.extract(source)
}
