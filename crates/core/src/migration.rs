//! Migration identity
//!
//! A migration is identified project-wide by the pair (component, name),
//! where the component is the Django app owning the `migrations/` package
//! and the name is the module name without its `.py` extension.
//!
//! # Node keys
//!
//! Graph nodes are keyed by `component__name` (e.g. `blog__0002_x`). The
//! component prefix keeps same-named migrations of different apps apart:
//! `blog__0001_initial` and `auth__0001_initial` are distinct nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{MigraphError, Result};

/// Separator between component and migration name in a node key
pub const KEY_SEPARATOR: &str = "__";

/// Project-wide identity of one migration
///
/// Equality is exact and case-sensitive on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MigrationId {
    /// Owning component (Django app label)
    pub component: String,
    /// Migration module name (e.g. "0001_initial")
    pub name: String,
}

impl MigrationId {
    pub fn new(component: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            name: name.into(),
        }
    }

    /// Fully qualified node key, `component__name`
    pub fn node_key(&self) -> String {
        format!("{}{}{}", self.component, KEY_SEPARATOR, self.name)
    }

    /// Derive the identity of a migration from its file path
    ///
    /// The component is the directory two levels above the file (the parent
    /// of `migrations/`), the name is the file stem.
    ///
    /// # Errors
    ///
    /// Returns [`MigraphError::MalformedPath`] if the path has no file name
    /// or fewer than two parent directories.
    pub fn from_path(path: &Path) -> Result<Self> {
        let malformed = || MigraphError::MalformedPath {
            path: path.to_path_buf(),
        };

        let name = path.file_stem().ok_or_else(malformed)?;
        let component = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .ok_or_else(malformed)?;

        Ok(Self::new(
            component.to_string_lossy(),
            name.to_string_lossy(),
        ))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.component, self.name)
    }
}
