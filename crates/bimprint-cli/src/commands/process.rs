//! bimprint process command - building model to printable solid.

use std::path::Path;

use anyhow::{Result, bail};
use colored::Colorize;

use bimprint_extract::ExternalExtractorConfig;
use bimprint_mesh::{ExportFormat, UnitOverride};
use bimprint_pipeline::{Pipeline, PipelineConfig, PresetStore, RunContext};

use crate::{Cli, OutputFormat, output};

/// Command-line overrides on top of the preset.
pub struct ProcessArgs<'a> {
    pub model: &'a Path,
    pub preset: &'a str,
    pub preset_dir: &'a Path,
    pub output: Option<&'a Path>,
    pub format: Option<ExportFormat>,
    pub min_wall_mm: Option<f64>,
    pub no_thicken: bool,
    pub use_extractor: bool,
    pub extractor_path: Option<&'a Path>,
    pub units: Option<UnitOverride>,
}

pub fn run(args: &ProcessArgs<'_>, ctx: &RunContext, cli: &Cli) -> Result<()> {
    if !args.model.exists() {
        bail!("Model file not found: {}", args.model.display());
    }

    let store = PresetStore::new(args.preset_dir);
    let mut config = store.load(args.preset)?;
    apply_overrides(&mut config, args)?;

    output::info(
        &format!(
            "Processing {} with preset {} (run {})",
            args.model.display(),
            args.preset,
            ctx.run_id
        ),
        cli.quiet,
    );

    let outcome = Pipeline::new(&config, ctx).run(args.model, args.output, args.format)?;

    match cli.output_format {
        OutputFormat::Json => {
            output::print(&outcome, cli.output_format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!(
                        "Wrote {} ({}, {})",
                        outcome.output_path.display(),
                        outcome.format,
                        output::format_bytes(outcome.bytes_written)
                    ),
                    cli.output_format,
                    cli.quiet,
                );

                println!("\n{}", "Stages:".bold());
                for stage in &outcome.stages {
                    println!(
                        "  {:<16} {:>10} vertices {:>10} faces",
                        stage.stage.cyan(),
                        stage.vertices,
                        stage.faces
                    );
                }

                println!();
                println!("  {}: {}", "Unit factor".cyan(), outcome.unit_factor);
                if let Some(factor) = outcome.printer_factor {
                    println!("  {}: {:.6}", "Printer scale".cyan(), factor);
                }
                println!("\n{}", outcome.report);
                println!(
                    "  {}: {}",
                    "Printable".cyan(),
                    if outcome.printable {
                        "Yes".green().bold()
                    } else {
                        "No".red().bold()
                    }
                );
            }
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &ProcessArgs<'_>) -> Result<()> {
    if let Some(min_wall) = args.min_wall_mm {
        config.optimize.min_thickness_mm = min_wall;
    }
    if args.no_thicken {
        config.optimize.thicken = false;
    }
    if let Some(units) = args.units {
        config.units = units;
    }

    if args.use_extractor {
        if let Some(path) = args.extractor_path {
            config
                .tudelft_extractor
                .get_or_insert_with(|| ExternalExtractorConfig::new(path))
                .path = path.to_path_buf();
        } else if config.tudelft_extractor.is_none() {
            bail!(
                "--use-extractor needs --extractor-path or a preset with a tudelft_extractor section"
            );
        }
    }

    config.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(model: &'a Path) -> ProcessArgs<'a> {
        ProcessArgs {
            model,
            preset: "default",
            preset_dir: Path::new("presets"),
            output: None,
            format: None,
            min_wall_mm: None,
            no_thicken: false,
            use_extractor: false,
            extractor_path: None,
            units: None,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let model = Path::new("house.obj");
        let mut config = PipelineConfig::default();
        let mut a = args(model);
        a.min_wall_mm = Some(3.5);
        a.units = Some(UnitOverride::Millimeters);
        apply_overrides(&mut config, &a).unwrap();
        assert_eq!(config.optimize.min_thickness_mm, 3.5);
        assert_eq!(config.units, UnitOverride::Millimeters);
        assert!(config.optimize.thicken);
    }

    #[test]
    fn test_extractor_requires_path() {
        let model = Path::new("house.ifc");
        let mut config = PipelineConfig::default();
        let mut a = args(model);
        a.use_extractor = true;
        assert!(apply_overrides(&mut config, &a).is_err());

        a.extractor_path = Some(Path::new("/opt/extractor"));
        apply_overrides(&mut config, &a).unwrap();
        let extractor = config.tudelft_extractor.unwrap();
        assert_eq!(extractor.path, Path::new("/opt/extractor"));
        assert_eq!(extractor.threads, 8);
    }

    #[test]
    fn test_preset_extractor_path_overridden() {
        let model = Path::new("house.ifc");
        let mut config = PipelineConfig::default();
        config.tudelft_extractor = Some(ExternalExtractorConfig::new("/opt/extractor"));
        let mut a = args(model);
        a.use_extractor = true;
        a.extractor_path = Some(Path::new("/opt/other"));
        apply_overrides(&mut config, &a).unwrap();
        assert_eq!(
            config.tudelft_extractor.unwrap().path,
            Path::new("/opt/other")
        );
    }

    #[test]
    fn test_invalid_override_rejected() {
        let model = Path::new("house.obj");
        let mut config = PipelineConfig::default();
        let mut a = args(model);
        a.min_wall_mm = Some(0.0);
        assert!(apply_overrides(&mut config, &a).is_err());
    }
}
