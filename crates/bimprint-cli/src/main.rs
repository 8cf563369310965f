//! bimprint: turn building models into print-ready solids.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=bimprint=info` - Stage-by-stage progress for every crate
//! - `RUST_LOG=bimprint_voxel=debug` - Grid sizes and envelope details
//! - `RUST_LOG=bimprint::timing=debug` - Performance timing
//! - `RUST_LOG=bimprint::extractor=info` - External extractor output
//!
//! # Example
//!
//! ```bash
//! # Process an exported scene with the default preset
//! bimprint process house.obj --preset default --output house.stl
//!
//! # Same run from the Revit add-in, keeping a log next to the output
//! bimprint process house.ifc --preset revit:default --output out/house.fbx --format fbx --log-file
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use bimprint_mesh::{ExportFormat, UnitOverride};
use bimprint_pipeline::RunContext;

mod commands;
mod output;

use commands::{presets, process, validate};

/// bimprint - Building model to 3D-printable solid.
///
/// Extracts the outer envelope of a building model, scales it to
/// millimeters and repairs it until it can be sent to a printer.
#[derive(Parser)]
#[command(name = "bimprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    output_format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a building model
    Process {
        /// Building model (IFC for the external extractor, OBJ scene otherwise)
        model: PathBuf,

        /// Preset name (`default`, `revit:default`) or path to a JSON preset
        #[arg(long, short, default_value = "default")]
        preset: String,

        /// Directory holding the `python/` and `revit/` preset families
        #[arg(long, default_value = "presets")]
        preset_dir: PathBuf,

        /// Output file; defaults to `<model stem>.<format>` in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format, overriding the preset
        #[arg(long, short)]
        format: Option<ExportArg>,

        /// Minimum wall thickness in mm
        #[arg(long, conflicts_with = "no_thicken")]
        min_wall_mm: Option<f64>,

        /// Skip the wall thickening stage
        #[arg(long)]
        no_thicken: bool,

        /// Acquire geometry through the external envelope extractor
        #[arg(long)]
        use_extractor: bool,

        /// Extractor executable, or a directory of schema-specific builds
        #[arg(long, requires = "use_extractor")]
        extractor_path: Option<PathBuf>,

        /// Source units, overriding the preset
        #[arg(long)]
        units: Option<UnitsArg>,

        /// Also write logs to `<output dir>/logs/bimprint.log`
        #[arg(long)]
        log_file: bool,
    },

    /// Check a mesh for watertightness, normals and wall thickness
    Validate {
        /// Input mesh file
        input: PathBuf,

        /// Rays cast for the wall thickness estimate
        #[arg(long, default_value_t = bimprint_mesh::DEFAULT_SAMPLE_COUNT)]
        samples: usize,

        /// Minimum wall thickness for the printable verdict (mm)
        #[arg(long, default_value = "2.0")]
        min_thickness: f64,
    },

    /// List available presets
    Presets {
        /// Preset directory
        #[arg(long, default_value = "presets")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportArg {
    /// Binary STL
    Stl,
    /// Wavefront OBJ
    Obj,
    /// ASCII FBX
    Fbx,
}

impl From<ExportArg> for ExportFormat {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Stl => ExportFormat::Stl,
            ExportArg::Obj => ExportFormat::Obj,
            ExportArg::Fbx => ExportFormat::Fbx,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum UnitsArg {
    /// Detect from the bounding box
    Auto,
    /// Coordinates are meters
    Meters,
    /// Coordinates are millimeters
    Millimeters,
}

impl From<UnitsArg> for UnitOverride {
    fn from(arg: UnitsArg) -> Self {
        match arg {
            UnitsArg::Auto => UnitOverride::Auto,
            UnitsArg::Meters => UnitOverride::Meters,
            UnitsArg::Millimeters => UnitOverride::Millimeters,
        }
    }
}

/// Initialize the tracing subscriber based on verbosity level.
///
/// With a log file, everything at info and above from the bimprint crates
/// is also appended there without ANSI colors, even when `quiet` is set.
fn init_tracing(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    // Check RUST_LOG first, then fall back to -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "warn,bimprint=info",
            2 => "warn,bimprint=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let stderr_layer = (!quiet).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_filter(filter)
    });

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new("warn,bimprint=info")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Print the code and suggestion of the library error behind `e`, if any.
fn report_error(e: &anyhow::Error) {
    eprintln!("{}: {}", "Error".red().bold(), e);

    let details = if let Some(err) = e.downcast_ref::<bimprint_pipeline::PipelineError>() {
        Some((err.detailed_code().to_string(), err.recovery_suggestion()))
    } else if let Some(err) = e.downcast_ref::<bimprint_extract::ExtractError>() {
        Some((err.code().to_string(), err.recovery_suggestion().to_string()))
    } else if let Some(err) = e.downcast_ref::<bimprint_voxel::VoxelError>() {
        Some((err.code().to_string(), err.recovery_suggestion().to_string()))
    } else if let Some(err) = e.downcast_ref::<bimprint_mesh::MeshError>() {
        Some((err.code().to_string(), err.recovery_suggestion().to_string()))
    } else {
        None
    };

    match details {
        Some((code, suggestion)) => {
            eprintln!("  {}: {}", "Code".cyan(), code);
            eprintln!("  {}: {}", "Suggestion".green(), suggestion);
        }
        None => {
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {}", "Caused by".yellow(), cause);
            }
        }
    }
}

fn main() -> Result<()> {
    // Install miette's panic hook for better error display
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    // Only process runs write files; other commands get a context rooted here
    let context = match &cli.command {
        Commands::Process {
            output, log_file, ..
        } => {
            let root = output
                .as_deref()
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let ctx = RunContext::new(root);
            if *log_file { ctx.with_log_file() } else { ctx }
        }
        _ => RunContext::new("."),
    };

    if let Err(e) = init_tracing(cli.verbose, cli.quiet, context.log_file.as_deref()) {
        report_error(&e);
        std::process::exit(1);
    }

    let result = match &cli.command {
        Commands::Process {
            model,
            preset,
            preset_dir,
            output,
            format,
            min_wall_mm,
            no_thicken,
            use_extractor,
            extractor_path,
            units,
            ..
        } => process::run(
            &process::ProcessArgs {
                model,
                preset,
                preset_dir,
                output: output.as_deref(),
                format: format.map(Into::into),
                min_wall_mm: *min_wall_mm,
                no_thicken: *no_thicken,
                use_extractor: *use_extractor,
                extractor_path: extractor_path.as_deref(),
                units: units.map(Into::into),
            },
            &context,
            &cli,
        ),
        Commands::Validate {
            input,
            samples,
            min_thickness,
        } => validate::run(input, *samples, *min_thickness, &cli),
        Commands::Presets { dir } => presets::run(dir, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            report_error(e);
        }
        std::process::exit(1);
    }

    Ok(())
}
