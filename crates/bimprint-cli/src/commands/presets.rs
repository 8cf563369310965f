//! bimprint presets command - list preset configurations.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use bimprint_pipeline::PresetStore;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct PresetList {
    dir: String,
    presets: Vec<PresetInfo>,
}

#[derive(Serialize)]
struct PresetInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(dir: &Path, cli: &Cli) -> Result<()> {
    let store = PresetStore::new(dir);
    let presets = store
        .available()
        .into_iter()
        .map(|name| match store.load(&name) {
            Ok(config) => PresetInfo {
                name,
                version: Some(config.version),
                error: None,
            },
            Err(e) => PresetInfo {
                name,
                version: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let result = PresetList {
        dir: dir.display().to_string(),
        presets,
    };

    match cli.output_format {
        OutputFormat::Json => {
            output::print(&result, cli.output_format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Available presets".bold().underline());
                println!("  {}: {}", "Directory".cyan(), result.dir);
                if result.presets.is_empty() {
                    println!("  {}", "none found".yellow());
                }
                for preset in &result.presets {
                    match (&preset.version, &preset.error) {
                        (_, Some(error)) => {
                            println!("  {} {} ({})", "✗".red(), preset.name, error)
                        }
                        (Some(version), None) => {
                            println!("  {} {} (v{})", "•".green(), preset.name, version)
                        }
                        (None, None) => println!("  {} {}", "•".green(), preset.name),
                    }
                }
            }
        }
    }

    Ok(())
}
