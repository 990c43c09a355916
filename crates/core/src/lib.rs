//! migraph core library
//!
//! Builds the dependency graph of a Django project's migrations without
//! importing or executing any of them:
//!
//! 1. [`discovery`] finds every `<app>/migrations/*.py` file
//! 2. [`parser`] reads the `dependencies` list of each `Migration` class
//!    off the tree-sitter syntax tree
//! 3. [`graph`] groups migrations into one cluster per app and records the
//!    "depends on" edges
//! 4. [`export`] writes the result as Graphviz DOT and renders it
//!
//! [`pipeline::scan_project`] runs steps 1-3 in one pass.

pub mod discovery;
pub mod error;
pub mod export;
pub mod graph;
pub mod migration;
pub mod parser;
pub mod pipeline;

// Re-export commonly used types
pub use error::{MigraphError, Result};
pub use graph::{Cluster, DependencyEdge, MigrationNode, ProjectGraph};
pub use migration::MigrationId;
pub use pipeline::{scan_project, ErrorPolicy, ScanOptions, ScanReport};
