use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use migraph_core::discovery::DiscoveryOptions;
use migraph_core::export::{self, DotOptions, ExportMode, ExportOptions, OutputFormat};
use migraph_core::{scan_project, ErrorPolicy, ScanOptions};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// migraph - Visualize Django migrations graph
#[derive(Parser)]
#[command(name = "migraph")]
#[command(version, disable_version_flag = true)] // Auto-pull version from Cargo.toml
#[command(about = "Visualize django migrations graph", long_about = None)]
struct Cli {
    /// Path to django project
    #[arg(default_value = ".")]
    project_path: PathBuf,

    /// Where to save dot file
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Name of out dot file
    #[arg(short, long, default_value = DotOptions::DEFAULT_NAME)]
    name: String,

    /// Open result image immediately
    #[arg(short, long, conflicts_with = "no_image")]
    view: bool,

    /// Verbose level. Up to 2
    #[arg(short = 'V', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Image output format
    #[arg(
        short,
        long,
        default_value = "svg",
        value_parser = parse_format,
        conflicts_with = "no_image"
    )]
    format: OutputFormat,

    /// Don't render, only save the dot file
    #[arg(long)]
    no_image: bool,

    /// Skip migrations matched by .gitignore/.ignore files
    #[arg(long)]
    respect_gitignore: bool,

    /// Stop at the first migration file that cannot be read or parsed
    #[arg(long)]
    fail_fast: bool,

    /// Print version (-V is taken by --verbose)
    #[arg(long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Cli {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            discovery: DiscoveryOptions {
                respect_ignore_files: self.respect_gitignore,
            },
            error_policy: if self.fail_fast {
                ErrorPolicy::Abort
            } else {
                ErrorPolicy::SkipFile
            },
        }
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            output_dir: self.output.clone(),
            dot: DotOptions::for_project(&self.project_path, self.name.clone()),
            mode: if self.no_image {
                ExportMode::Save
            } else {
                ExportMode::Render {
                    format: self.format,
                    view: self.view,
                }
            },
        }
    }
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    value.parse::<OutputFormat>().map_err(|_| {
        let known: Vec<&str> = OutputFormat::ALL.iter().map(|f| f.as_str()).collect();
        format!("unknown format '{value}' (expected one of: {})", known.join(", "))
    })
}

/// `RUST_LOG` wins; otherwise -V count picks info, debug or trace
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let report = scan_project(&cli.project_path, &cli.scan_options())
        .with_context(|| format!("failed to scan {}", cli.project_path.display()))?;

    if !report.is_complete() {
        warn!(
            "{} of {} migration files could not be processed and are missing from the graph",
            report.failures.len(),
            report.files_scanned
        );
    }

    let path = export::export(&report.graph, &cli.export_options())
        .context("failed to export migration graph")?;
    println!("{}", path.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
