//! Single-pass project scan: locate → extract → build
//!
//! Migration files are discovered, sorted for a reproducible insertion
//! order, and processed one at a time on the calling thread. Every
//! discovered migration becomes a node, even when it declares no
//! dependencies, and each declared dependency becomes an edge.
//!
//! Modules whose name starts with `_` or `~` (`__init__.py`, editor
//! backups) are not migrations, matching Django's own loader, and are
//! skipped.
//!
//! # Error policy
//!
//! A missing project root and a path outside the
//! `<component>/migrations/<name>.py` shape are always fatal. A file that
//! cannot be read or parsed is, by default, recorded as a [`FileFailure`]
//! and skipped; with [`ErrorPolicy::Abort`] the first such error ends the
//! scan instead.

use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::discovery::{self, DiscoveryOptions};
use crate::error::{MigraphError, Result};
use crate::graph::ProjectGraph;
use crate::migration::MigrationId;
use crate::parser::DependencyExtractor;

/// What to do when one migration file cannot be read or parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Report the file and carry on with the rest
    #[default]
    SkipFile,
    /// Stop the scan at the first failing file
    Abort,
}

impl ErrorPolicy {
    /// Whether `error` for one file may be skipped under this policy
    pub fn skips(self, error: &MigraphError) -> bool {
        match error {
            MigraphError::MalformedPath { .. } => false,
            _ => self == ErrorPolicy::SkipFile,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub discovery: DiscoveryOptions,
    pub error_policy: ErrorPolicy,
}

/// A migration file that was skipped
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: MigraphError,
}

/// Outcome of a project scan
#[derive(Debug)]
pub struct ScanReport {
    /// The assembled graph
    pub graph: ProjectGraph,
    /// Number of migration files discovered
    pub files_scanned: usize,
    /// Files skipped under [`ErrorPolicy::SkipFile`]
    pub failures: Vec<FileFailure>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scan a Django project and build its migration graph
///
/// # Arguments
/// * `root` - Project root directory
/// * `options` - Discovery and error-policy settings
///
/// # Errors
/// - [`MigraphError::PathNotFound`] if `root` does not exist
/// - [`MigraphError::MalformedPath`] for a file without a component
///   directory, whatever the policy
/// - the first per-file error when `options.error_policy` is
///   [`ErrorPolicy::Abort`]
///
/// # Example
/// ```no_run
/// use migraph_core::pipeline::{scan_project, ScanOptions};
///
/// let report = scan_project(std::path::Path::new("my_project"), &ScanOptions::default())?;
/// println!("{} migrations in {} apps",
///          report.graph.node_count(),
///          report.graph.cluster_count());
/// # Ok::<(), migraph_core::MigraphError>(())
/// ```
pub fn scan_project(root: &Path, options: &ScanOptions) -> Result<ScanReport> {
    let mut paths: Vec<PathBuf> = discovery::discover_migrations(root, &options.discovery)?.collect();
    // Sort paths for deterministic insertion order
    paths.sort();
    debug!("Found {} migration files under {}", paths.len(), root.display());

    let mut extractor = DependencyExtractor::new()?;

    let mut graph = ProjectGraph::new();
    let mut failures = Vec::new();

    for path in &paths {
        trace!("Processing migration {}", path.display());
        match process_file(&mut extractor, &mut graph, path) {
            Ok(()) => {}
            Err(error) if options.error_policy.skips(&error) => {
                warn!("Skipping {}", error);
                failures.push(FileFailure {
                    path: path.clone(),
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        "Built migration graph: {} nodes, {} edges, {} apps ({} of {} files skipped)",
        graph.node_count(),
        graph.edge_count(),
        graph.cluster_count(),
        failures.len(),
        paths.len()
    );

    Ok(ScanReport {
        graph,
        files_scanned: paths.len(),
        failures,
    })
}

/// Add one migration file's node and outgoing edges to the graph
///
/// The graph is only touched once extraction has succeeded, so a failing
/// file leaves no trace in it.
pub fn process_file(
    extractor: &mut DependencyExtractor,
    graph: &mut ProjectGraph,
    path: &Path,
) -> Result<()> {
    let owner = MigrationId::from_path(path)?;
    if !is_migration_name(&owner.name) {
        trace!("Skipping non-migration module {}", path.display());
        return Ok(());
    }
    trace!("app: {}, migration name: {}", owner.component, owner.name);

    let dependencies = extractor.extract_file(path)?;

    graph.record_migration(&owner);
    for dependency in &dependencies {
        graph.record_dependency(&owner, dependency);
    }
    Ok(())
}

fn is_migration_name(name: &str) -> bool {
    !name.starts_with(['_', '~'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_migration_without_dependencies_is_a_node() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "blog/migrations/0001_initial.py",
            "class Migration(migrations.Migration):\n    initial = True\n    dependencies = []\n",
        );

        let report = scan_project(temp_dir.path(), &ScanOptions::default()).unwrap();

        assert_eq!(report.files_scanned, 1);
        assert!(report.graph.contains(&MigrationId::new("blog", "0001_initial")));
        assert_eq!(report.graph.edge_count(), 0);
    }

    #[test]
    fn test_private_modules_are_not_migrations() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "blog/migrations/__init__.py", "");
        write(temp_dir.path(), "blog/migrations/~0002_backup.py", "");
        write(
            temp_dir.path(),
            "blog/migrations/0001_initial.py",
            "class Migration(migrations.Migration):\n    dependencies = []\n",
        );

        let report = scan_project(temp_dir.path(), &ScanOptions::default()).unwrap();

        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.graph.node_count(), 1);
        assert!(!report.graph.contains(&MigrationId::new("blog", "__init__")));
        assert!(report.is_complete());
    }

    #[test]
    fn test_parse_error_skips_file_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "blog/migrations/0001_initial.py",
            "class Migration(migrations.Migration):\n    dependencies = []\n",
        );
        write(
            temp_dir.path(),
            "blog/migrations/0002_broken.py",
            "class Migration(migrations.Migration:\n    dependencies = [('blog', '0001_initial')]\n",
        );
        write(
            temp_dir.path(),
            "blog/migrations/0003_after.py",
            "class Migration(migrations.Migration):\n    dependencies = [('blog', '0001_initial')]\n",
        );

        let report = scan_project(temp_dir.path(), &ScanOptions::default()).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("blog/migrations/0002_broken.py"));
        assert!(matches!(report.failures[0].error, MigraphError::Parse { .. }));

        // the broken file contributes nothing, its siblings are intact
        assert!(!report.graph.contains(&MigrationId::new("blog", "0002_broken")));
        assert!(report.graph.contains(&MigrationId::new("blog", "0003_after")));
        assert_eq!(report.graph.edge_count(), 1);
    }

    #[test]
    fn test_abort_policy_stops_on_first_error() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "blog/migrations/0001_broken.py", "def (:\n");

        let options = ScanOptions {
            error_policy: ErrorPolicy::Abort,
            ..ScanOptions::default()
        };

        match scan_project(temp_dir.path(), &options) {
            Err(MigraphError::Parse { path, .. }) => {
                assert!(path.ends_with("blog/migrations/0001_broken.py"));
            }
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_path_is_never_skipped() {
        let malformed = MigraphError::MalformedPath {
            path: PathBuf::from("/migrations/0001_initial.py"),
        };
        let unreadable = MigraphError::Io {
            path: PathBuf::from("blog/migrations/0001_initial.py"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };

        assert!(!ErrorPolicy::SkipFile.skips(&malformed));
        assert!(!ErrorPolicy::Abort.skips(&malformed));
        assert!(ErrorPolicy::SkipFile.skips(&unreadable));
        assert!(!ErrorPolicy::Abort.skips(&unreadable));
    }

    #[test]
    fn test_process_file_rejects_path_without_component() {
        let mut extractor = DependencyExtractor::new().unwrap();
        let mut graph = ProjectGraph::new();

        let result = process_file(&mut extractor, &mut graph, Path::new("/migrations/0001_initial.py"));

        assert!(matches!(result, Err(MigraphError::MalformedPath { .. })));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = TempDir::new().unwrap();

        let result = scan_project(&temp_dir.path().join("nope"), &ScanOptions::default());

        assert!(matches!(result, Err(MigraphError::PathNotFound { .. })));
    }

    #[test]
    fn test_empty_project() {
        let temp_dir = TempDir::new().unwrap();

        let report = scan_project(temp_dir.path(), &ScanOptions::default()).unwrap();

        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.graph.node_count(), 0);
        assert!(report.is_complete());
    }
}
