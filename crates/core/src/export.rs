//! Graphviz export
//!
//! Composes the [`ProjectGraph`] into one DOT `digraph` with a
//! `subgraph cluster__<component>` per component, then either saves the
//! DOT source or renders it with the Graphviz `dot` executable.
//!
//! Output files follow the Graphviz convention of keeping the source next
//! to the image: `<dir>/<name>.gv` and `<dir>/<name>.gv.<format>`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{MigraphError, Result};
use crate::graph::ProjectGraph;

/// Image formats accepted by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Svg,
    Svgz,
    Png,
    Jpg,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Pdf,
    Ps,
    Eps,
    Json,
    Plain,
    Xdot,
    Dot,
    Canon,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 17] = [
        OutputFormat::Svg,
        OutputFormat::Svgz,
        OutputFormat::Png,
        OutputFormat::Jpg,
        OutputFormat::Jpeg,
        OutputFormat::Gif,
        OutputFormat::Bmp,
        OutputFormat::Tiff,
        OutputFormat::Webp,
        OutputFormat::Pdf,
        OutputFormat::Ps,
        OutputFormat::Eps,
        OutputFormat::Json,
        OutputFormat::Plain,
        OutputFormat::Xdot,
        OutputFormat::Dot,
        OutputFormat::Canon,
    ];

    /// Graphviz name of the format, also used as file extension
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Svgz => "svgz",
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Webp => "webp",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Ps => "ps",
            OutputFormat::Eps => "eps",
            OutputFormat::Json => "json",
            OutputFormat::Plain => "plain",
            OutputFormat::Xdot => "xdot",
            OutputFormat::Dot => "dot",
            OutputFormat::Canon => "canon",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = MigraphError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| MigraphError::UnknownFormat(s.to_string()))
    }
}

/// Naming of the top-level graph
#[derive(Debug, Clone)]
pub struct DotOptions {
    /// Graph name and output base name
    pub name: String,
    /// Caption of the whole graph
    pub label: Option<String>,
}

impl DotOptions {
    pub const DEFAULT_NAME: &'static str = "migrations";

    /// Options for a project scanned from `root`
    pub fn for_project(root: &Path, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: Some(format!(
                "Migration graph of {} Django project",
                root.display()
            )),
        }
    }
}

impl Default for DotOptions {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            label: None,
        }
    }
}

/// What the sink produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Write the DOT source only
    Save,
    /// Write the DOT source and render it, optionally opening a viewer
    Render { format: OutputFormat, view: bool },
}

impl Default for ExportMode {
    fn default() -> Self {
        ExportMode::Render {
            format: OutputFormat::default(),
            view: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory receiving the output files, created if missing
    pub output_dir: PathBuf,
    pub dot: DotOptions,
    pub mode: ExportMode,
}

/// DOT rendering of a [`ProjectGraph`]
///
/// Every cluster is declared with its label and nodes first; edges are
/// added afterwards by re-opening the target's cluster, so each node is
/// first seen (and drawn) inside its own component.
pub struct DotGraph<'a> {
    graph: &'a ProjectGraph,
    options: &'a DotOptions,
}

impl<'a> DotGraph<'a> {
    pub fn new(graph: &'a ProjectGraph, options: &'a DotOptions) -> Self {
        Self { graph, options }
    }
}

impl fmt::Display for DotGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph;

        writeln!(f, "digraph {} {{", quote(&self.options.name))?;
        if let Some(label) = &self.options.label {
            writeln!(f, "\tgraph [label={}]", quote(label))?;
        }

        for cluster in graph.clusters() {
            writeln!(f, "\tsubgraph {} {{", quote(&cluster_id(cluster.name())))?;
            writeln!(f, "\t\tgraph [label={}]", quote(cluster.label()))?;
            for node in graph.cluster_nodes(cluster) {
                writeln!(f, "\t\t{} [label={}]", quote(&node.key), quote(&node.label))?;
            }
            writeln!(f, "\t}}")?;
        }

        for cluster in graph.clusters().filter(|cluster| cluster.edge_count() > 0) {
            writeln!(f, "\tsubgraph {} {{", quote(&cluster_id(cluster.name())))?;
            for (from, to) in graph.cluster_edges(cluster) {
                writeln!(f, "\t\t{} -> {}", quote(&from.key), quote(&to.key))?;
            }
            writeln!(f, "\t}}")?;
        }

        writeln!(f, "}}")
    }
}

/// Compose the graph into DOT source
pub fn to_dot(graph: &ProjectGraph, options: &DotOptions) -> String {
    DotGraph::new(graph, options).to_string()
}

/// Hand the graph to the Graphviz sink
///
/// # Returns
/// Path of the produced file: the rendered image, or the DOT source in
/// [`ExportMode::Save`].
///
/// # Errors
/// - [`MigraphError::Io`] if the output directory or source file cannot be
///   written
/// - [`MigraphError::Render`] if `dot` is missing or fails, or the viewer
///   cannot be launched
pub fn export(graph: &ProjectGraph, options: &ExportOptions) -> Result<PathBuf> {
    let source = to_dot(graph, &options.dot);
    let source_path = save_source(&source, &options.output_dir, &options.dot.name)?;

    match options.mode {
        ExportMode::Save => {
            info!("Saved dotfile to {}", source_path.display());
            Ok(source_path)
        }
        ExportMode::Render { format, view } => {
            let image_path = render(&source_path, format)?;
            info!("Saved image to {}", image_path.display());
            if view {
                open_viewer(&image_path)?;
            }
            Ok(image_path)
        }
    }
}

fn save_source(source: &str, output_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
    let path = output_dir.join(format!("{name}.gv"));
    fs::write(&path, source).map_err(io_error(&path))?;
    debug!("Wrote DOT source to {}", path.display());
    Ok(path)
}

/// Run `dot -T<format>` on a saved source file
fn render(source_path: &Path, format: OutputFormat) -> Result<PathBuf> {
    let render_error = |message: String| MigraphError::Render {
        path: source_path.to_path_buf(),
        message,
    };

    let dot = which::which("dot")
        .map_err(|err| render_error(format!("Graphviz `dot` executable not found: {err}")))?;

    let mut image_name = source_path.as_os_str().to_owned();
    image_name.push(format!(".{format}"));
    let image_path = PathBuf::from(image_name);

    debug!("Running {} -T{} on {}", dot.display(), format, source_path.display());
    let output = Command::new(&dot)
        .arg(format!("-T{format}"))
        .arg("-o")
        .arg(&image_path)
        .arg(source_path)
        .output()
        .map_err(|err| render_error(format!("failed to run {}: {err}", dot.display())))?;

    if !output.status.success() {
        // Leave no half-written image behind
        let _ = fs::remove_file(&image_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(render_error(format!(
            "dot exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(image_path)
}

fn open_viewer(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    };

    let status = command.arg(path).status().map_err(|err| MigraphError::Render {
        path: path.to_path_buf(),
        message: format!("failed to launch viewer: {err}"),
    })?;

    if !status.success() {
        return Err(MigraphError::Render {
            path: path.to_path_buf(),
            message: format!("viewer exited with {status}"),
        });
    }
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MigraphError {
    let path = path.to_path_buf();
    move |source| MigraphError::Io { path, source }
}

fn cluster_id(component: &str) -> String {
    format!("cluster__{component}")
}

fn quote(input: &str) -> String {
    format!("\"{}\"", escape_dot_label(input))
}

fn escape_dot_label(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
