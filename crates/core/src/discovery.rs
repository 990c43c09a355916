//! Migration file discovery
//!
//! Enumerates every `*.py` file that sits directly inside a directory named
//! `migrations`, at any depth below a project root. Hidden directories are
//! skipped. Ignore files (`.gitignore`, `.ignore`) are only honoured when
//! asked for, since a Django project often vendors apps whose migrations
//! still belong in the graph.
//!
//! The walk is lazy and its order is whatever the filesystem yields;
//! callers that need reproducible output sort the paths themselves.

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::error::{MigraphError, Result};

/// Pattern (relative to the project root) of a migration module
pub const MIGRATIONS_PATTERN: &str = "**/migrations/*.py";

/// Knobs for the directory walk
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Skip files matched by `.gitignore`/`.ignore` files
    pub respect_ignore_files: bool,
}

/// Lazy sequence of migration file paths under one root
///
/// Yields absolute paths. Walk errors (unreadable directories, broken
/// links) are logged and skipped.
pub struct MigrationFiles {
    root: PathBuf,
    walker: ignore::Walk,
    matcher: GlobMatcher,
}

impl Iterator for MigrationFiles {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        for result in self.walker.by_ref() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Error walking {}: {}", self.root.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Ok(rel_path) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            if self.matcher.is_match(rel_path) {
                trace!("Found migration file {}", entry.path().display());
                return Some(entry.into_path());
            }
        }
        None
    }
}

/// Discover migration files below `root`
///
/// # Arguments
/// * `root` - Project root directory
/// * `options` - Walk configuration
///
/// # Returns
/// A lazy iterator of absolute paths matching `<root>/**/migrations/*.py`.
/// An empty iterator is a valid result.
///
/// # Errors
/// [`MigraphError::PathNotFound`] if `root` does not exist.
///
/// # Example
/// ```no_run
/// use migraph_core::discovery::{self, DiscoveryOptions};
///
/// let files = discovery::discover_migrations(
///     std::path::Path::new("my_project"),
///     &DiscoveryOptions::default(),
/// )?;
/// for path in files {
///     println!("{}", path.display());
/// }
/// # Ok::<(), migraph_core::MigraphError>(())
/// ```
pub fn discover_migrations(root: &Path, options: &DiscoveryOptions) -> Result<MigrationFiles> {
    debug!("Search migrations files of project {}", root.display());

    // Canonicalize so every yielded path is absolute and has enough
    // parents for identity derivation, even for a root of "."
    let canonical_root = root.canonicalize().map_err(|_| MigraphError::PathNotFound {
        path: root.to_path_buf(),
    })?;

    Ok(MigrationFiles {
        walker: build_walker(&canonical_root, options),
        matcher: build_matcher()?,
        root: canonical_root,
    })
}

/// `*` must not cross a separator, otherwise `migrations/sub/x.py` would match
fn build_matcher() -> std::result::Result<GlobMatcher, globset::Error> {
    let glob = GlobBuilder::new(MIGRATIONS_PATTERN)
        .literal_separator(true)
        .build()?;
    Ok(glob.compile_matcher())
}

fn build_walker(root: &Path, options: &DiscoveryOptions) -> ignore::Walk {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(true)
        .git_ignore(options.respect_ignore_files)
        .git_exclude(options.respect_ignore_files)
        .ignore(options.respect_ignore_files)
        .parents(options.respect_ignore_files);

    // Explicitly add .gitignore if it exists (WalkBuilder only picks it up
    // automatically inside a git repository)
    if options.respect_ignore_files {
        let gitignore_path = root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(err) = builder.add_ignore(&gitignore_path) {
                warn!("Ignoring unreadable {}: {}", gitignore_path.display(), err);
            }
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap();
    }

    fn discover(root: &Path, options: &DiscoveryOptions) -> Vec<PathBuf> {
        let mut files: Vec<_> = discover_migrations(root, options).unwrap().collect();
        files.sort();
        files
    }

    #[test]
    fn test_discover_basic() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(root, "blog/migrations/0001_initial.py");
        touch(root, "blog/migrations/__init__.py");
        touch(root, "blog/models.py");

        let files = discover(root, &DiscoveryOptions::default());

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.is_absolute()));
        assert!(files.iter().any(|p| p.ends_with("blog/migrations/0001_initial.py")));
        assert!(files.iter().any(|p| p.ends_with("blog/migrations/__init__.py")));
    }

    #[test]
    fn test_only_direct_children_of_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(root, "shop/migrations/0001_initial.py");
        touch(root, "shop/migrations/legacy/0001_old.py");
        touch(root, "shop/migrations/0001_initial.pyc");
        touch(root, "shop/migrations_old/0001_initial.py");

        let files = discover(root, &DiscoveryOptions::default());

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("shop/migrations/0001_initial.py"));
    }

    #[test]
    fn test_nested_apps() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(root, "project/apps/auth/migrations/0001_initial.py");
        touch(root, "blog/migrations/0001_initial.py");

        let files = discover(root, &DiscoveryOptions::default());

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_hidden_directories_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(root, ".venv/lib/django/contrib/auth/migrations/0001_initial.py");
        touch(root, "blog/migrations/0001_initial.py");

        let files = discover(root, &DiscoveryOptions::default());

        assert_eq!(files.len(), 1);
        assert!(!files[0].to_string_lossy().contains(".venv"));
    }

    #[test]
    fn test_gitignore_only_when_requested() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let mut gitignore = File::create(root.join(".gitignore")).unwrap();
        gitignore.write_all(b"vendor/\n").unwrap();

        touch(root, "vendor/payments/migrations/0001_initial.py");
        touch(root, "blog/migrations/0001_initial.py");

        let all = discover(root, &DiscoveryOptions::default());
        assert_eq!(all.len(), 2);

        let filtered = discover(
            root,
            &DiscoveryOptions {
                respect_ignore_files: true,
            },
        );
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].ends_with("blog/migrations/0001_initial.py"));
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let files = discover(temp_dir.path(), &DiscoveryOptions::default());

        assert!(files.is_empty());
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = discover_migrations(&missing, &DiscoveryOptions::default())
            .err()
            .expect("missing root must fail");

        match err {
            MigraphError::PathNotFound { path } => assert_eq!(path, missing),
            other => panic!("Expected PathNotFound, got {other:?}"),
        }
    }
}
