//! Acquisition configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bimprint_voxel::EnvelopeMethod;

use crate::category::DEFAULT_CATEGORIES;

/// What to collect and how to reduce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Categories to collect; authoring-tool names or IFC entity names.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub method: EnvelopeMethod,
    #[serde(default)]
    pub voxel_pitch: Option<f64>,
    /// Delegate to an external extractor instead of collecting in-process.
    #[serde(default)]
    pub external: Option<ExternalExtractorConfig>,
}

fn default_include() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
            method: EnvelopeMethod::default(),
            voxel_pitch: None,
            external: None,
        }
    }
}

impl ExtractionConfig {
    /// Whether the external extractor path is selected.
    pub fn uses_external(&self) -> bool {
        self.external.is_some()
    }
}

/// Settings for the external envelope extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalExtractorConfig {
    /// Executable, or a directory holding one executable per schema.
    pub path: PathBuf,
    /// Levels of detail to generate.
    pub lods: Vec<f64>,
    pub voxel_size: f64,
    pub threads: u32,
    pub timeout_secs: u64,
    pub generate_exterior: bool,
    pub generate_interior: bool,
    pub output_obj: bool,
    pub output_step: bool,
    pub tolerances: ExtractorTolerances,
}

impl Default for ExternalExtractorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            lods: vec![2.2],
            voxel_size: 1.0,
            threads: 8,
            timeout_secs: 3600,
            generate_exterior: true,
            generate_interior: false,
            output_obj: true,
            output_step: false,
            tolerances: ExtractorTolerances::default(),
        }
    }
}

impl ExternalExtractorConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Geometric tolerances passed through to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorTolerances {
    pub spatial: f64,
    pub angular: f64,
    pub area: f64,
}

impl Default for ExtractorTolerances {
    fn default() -> Self {
        Self {
            spatial: 0.01,
            angular: 1.0,
            area: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_defaults_from_partial_json() {
        let config: ExternalExtractorConfig =
            serde_json::from_str(r#"{"path": "/opt/extractor", "threads": 2}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("/opt/extractor"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.lods, vec![2.2]);
        assert_eq!(config.timeout(), Duration::from_secs(3600));
        assert!(config.generate_exterior);
        assert!(!config.output_step);
    }

    #[test]
    fn test_extraction_defaults() {
        let config: ExtractionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ExtractionConfig::default());
        assert!(config.include.iter().any(|c| c == "IfcWall"));
        assert!(!config.uses_external());
    }
}
