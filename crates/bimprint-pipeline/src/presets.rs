//! Preset discovery.
//!
//! Presets live in two families below one directory:
//!
//! ```text
//! presets/
//!   python/default.json   -> "python:default" or just "default"
//!   revit/default.json    -> "revit:default"
//! ```
//!
//! A name that is an existing path is loaded directly.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

const PYTHON: &str = "python";
const REVIT: &str = "revit";

/// A directory of preset configurations.
#[derive(Debug, Clone)]
pub struct PresetStore {
    root: PathBuf,
}

impl PresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn python_dir(&self) -> PathBuf {
        self.root.join(PYTHON)
    }

    pub fn revit_dir(&self) -> PathBuf {
        self.root.join(REVIT)
    }

    /// File a preset name refers to.
    pub fn resolve(&self, preset: &str) -> PipelineResult<PathBuf> {
        let direct = Path::new(preset);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let (family, name) = split_preset_name(preset);
        let dir = if family == REVIT {
            self.revit_dir()
        } else {
            self.python_dir()
        };
        let path = dir.join(format!("{name}.json"));
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::PresetNotFound {
                name: preset.to_string(),
                searched: dir,
            })
        }
    }

    /// Resolve, parse and validate a preset.
    pub fn load(&self, preset: &str) -> PipelineResult<PipelineConfig> {
        let path = self.resolve(preset)?;
        info!(preset, path = %path.display(), "Loading preset");
        PipelineConfig::load(&path)
    }

    /// Every preset as `family:name`, python first, sorted within a family.
    pub fn available(&self) -> Vec<String> {
        let mut presets = collect(&self.python_dir(), PYTHON);
        presets.extend(collect(&self.revit_dir(), REVIT));
        presets
    }
}

fn split_preset_name(preset: &str) -> (&str, &str) {
    match preset.split_once(':') {
        Some((family, name)) if family == PYTHON || family == REVIT => (family, name),
        _ => (PYTHON, preset),
    }
}

fn collect(dir: &Path, family: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .filter_map(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(|stem| format!("{family}:{stem}"))
        })
        .collect();
    names.sort();
    names
}
