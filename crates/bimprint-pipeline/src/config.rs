//! Pipeline configuration.
//!
//! A configuration is one JSON document, usually a preset:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "categories": { "include": ["OST_Walls", "IfcSlab"], "exclude": [] },
//!   "extraction": { "method": "voxel" },
//!   "simplify": "medium",
//!   "units": "auto",
//!   "printer": { "target_size_mm": [220, 220, 250] },
//!   "optimize": { "min_thickness_mm": 2.0, "smooth_iterations": 2 },
//!   "export": { "format": "stl" }
//! }
//! ```
//!
//! Only `version` is required. `categories.include` must be non-empty
//! unless `tudelft_extractor` is set, in which case the extractor decides
//! what to keep.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bimprint_extract::{ExternalExtractorConfig, ExtractionConfig};
use bimprint_mesh::{DEFAULT_SAMPLE_COUNT, ExportFormat, PrinterVolume, SimplifyLevel, UnitOverride};
use bimprint_voxel::{DEFAULT_MAX_VOXELS, EnvelopeMethod, EnvelopeParams, ThickenParams};

use crate::error::{PipelineError, PipelineResult};

/// Complete configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    /// Decimation after envelope extraction; skipped when absent.
    #[serde(default)]
    pub simplify: Option<SimplifyLevel>,
    /// Uniform factor applied after unit normalization.
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub units: UnitOverride,
    #[serde(default)]
    pub printer: Option<PrinterSettings>,
    #[serde(default)]
    pub optimize: OptimizeConfig,
    #[serde(default)]
    pub export: ExportConfig,
    /// Delegate acquisition to the external extractor.
    #[serde(default)]
    pub tudelft_extractor: Option<ExternalExtractorConfig>,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub method: EnvelopeMethod,
    pub voxel_pitch: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrinterSettings {
    /// Edge of a cubic build volume, or `[x, y, z]`.
    pub target_size_mm: PrinterVolume,
}

/// Settings of the optimizer stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub min_thickness_mm: f64,
    /// Run volumetric wall thickening.
    pub thicken: bool,
    /// Laplacian smoothing passes; 0 disables smoothing.
    pub smooth_iterations: u32,
    /// Thickness rays in the final validation.
    pub sample_count: usize,
    /// Voxel budget shared by envelope extraction and thickening.
    pub max_voxels: usize,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            min_thickness_mm: 2.0,
            thicken: true,
            smooth_iterations: 0,
            sample_count: DEFAULT_SAMPLE_COUNT,
            max_voxels: DEFAULT_MAX_VOXELS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            categories: CategoryConfig {
                include: bimprint_extract::DEFAULT_CATEGORIES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                exclude: Vec::new(),
            },
            extraction: ExtractionSettings::default(),
            simplify: None,
            scale: default_scale(),
            units: UnitOverride::Auto,
            printer: None,
            optimize: OptimizeConfig::default(),
            export: ExportConfig::default(),
            tudelft_extractor: None,
        }
    }
}

fn positive(name: &str, value: f64) -> PipelineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON without validating it.
    pub fn from_json(json_str: &str) -> PipelineResult<Self> {
        serde_json::from_str(json_str).map_err(|e| PipelineError::config(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::config(e.to_string()))
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("failed to read {}", path.display()), e))?;
        let config = Self::from_json(&text).map_err(|e| match e {
            PipelineError::Config { message } => {
                PipelineError::config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check required keys and numeric ranges.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.version.trim().is_empty() {
            return Err(PipelineError::config("missing required key: version"));
        }

        if self.tudelft_extractor.is_some() {
            info!("External extractor enabled; skipping category validation");
        } else if self.categories.include.is_empty() {
            return Err(PipelineError::config(
                "missing required key: categories.include",
            ));
        }

        if let Some(pitch) = self.extraction.voxel_pitch {
            positive("extraction.voxel_pitch", pitch)?;
        }
        positive("scale", self.scale)?;
        if let Some(printer) = &self.printer {
            for limit in printer.target_size_mm.limits() {
                positive("printer.target_size_mm", limit)?;
            }
        }

        let opt = &self.optimize;
        positive("optimize.min_thickness_mm", opt.min_thickness_mm)?;
        if opt.sample_count == 0 {
            return Err(PipelineError::config("optimize.sample_count must be positive"));
        }
        if opt.max_voxels == 0 {
            return Err(PipelineError::config("optimize.max_voxels must be positive"));
        }

        if let Some(ext) = &self.tudelft_extractor {
            positive("tudelft_extractor.voxel_size", ext.voxel_size)?;
            if ext.threads == 0 {
                return Err(PipelineError::config("tudelft_extractor.threads must be positive"));
            }
            if ext.timeout_secs == 0 {
                return Err(PipelineError::config(
                    "tudelft_extractor.timeout_secs must be positive",
                ));
            }
        }

        Ok(())
    }

    /// Acquisition settings.
    pub fn extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            include: self.categories.include.clone(),
            exclude: self.categories.exclude.clone(),
            method: self.extraction.method,
            voxel_pitch: self.extraction.voxel_pitch,
            external: self.tudelft_extractor.clone(),
        }
    }

    pub fn envelope_params(&self) -> EnvelopeParams {
        EnvelopeParams {
            method: self.extraction.method,
            voxel_pitch: self.extraction.voxel_pitch,
            max_voxels: self.optimize.max_voxels,
        }
    }

    pub fn thicken_params(&self) -> ThickenParams {
        ThickenParams::new(self.optimize.min_thickness_mm).with_max_voxels(self.optimize.max_voxels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config =
            PipelineConfig::from_json(r#"{"version": "1.0", "categories": {"include": ["IfcWall"]}}"#)
                .unwrap();
        config.validate().unwrap();

        assert_eq!(config.scale, 1.0);
        assert_eq!(config.units, UnitOverride::Auto);
        assert_eq!(config.optimize.min_thickness_mm, 2.0);
        assert!(config.optimize.thicken);
        assert_eq!(config.optimize.sample_count, 250);
        assert_eq!(config.export.format, ExportFormat::Stl);
        assert!(config.simplify.is_none());
        assert!(config.printer.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = PipelineConfig::from_json(
            r#"{
                "version": "1.0",
                "categories": {"include": ["OST_Walls"], "exclude": ["IfcFurnishingElement"]},
                "extraction": {"method": "convex_hull"},
                "simplify": 0.3,
                "units": "millimeters",
                "printer": {"target_size_mm": [220, 220, 250]},
                "optimize": {"min_thickness_mm": 1.2, "smooth_iterations": 3},
                "export": {"format": "obj"}
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.extraction.method, EnvelopeMethod::ConvexHull);
        assert_eq!(config.simplify, Some(SimplifyLevel::Ratio(0.3)));
        assert_eq!(config.units, UnitOverride::Millimeters);
        assert_eq!(
            config.printer.unwrap().target_size_mm,
            PrinterVolume::Box([220.0, 220.0, 250.0])
        );
        assert_eq!(config.export.format, ExportFormat::Obj);
        assert_eq!(config.extraction_config().exclude, vec!["IfcFurnishingElement"]);
    }

    #[test]
    fn test_missing_version() {
        let err = PipelineConfig::from_json(r#"{"categories": {"include": ["IfcWall"]}}"#)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));

        let config = PipelineConfig {
            version: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_include_needs_extractor() {
        let config = PipelineConfig::from_json(r#"{"version": "1.0"}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("categories.include"));

        let config = PipelineConfig::from_json(
            r#"{"version": "1.0", "tudelft_extractor": {"path": "/opt/extractor"}}"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.extraction_config().uses_external());
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let mut config = PipelineConfig::default();
        config.optimize.min_thickness_mm = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.scale = -2.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.printer = Some(PrinterSettings {
            target_size_mm: PrinterVolume::Box([200.0, 0.0, 200.0]),
        });
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.optimize.sample_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_simplify_level() {
        let err =
            PipelineConfig::from_json(r#"{"version": "1.0", "simplify": "extreme"}"#).unwrap_err();
        assert!(err.to_string().contains("extreme"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig {
            simplify: Some(SimplifyLevel::Medium),
            ..Default::default()
        };
        let parsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
