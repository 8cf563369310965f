//! Stage sequencing for one model.
//!
//! ```text
//! acquire -> normalize units -> envelope -> [simplify] -> [scale]
//!         -> [printer fit] -> repair -> [thicken] -> [smooth] -> validate -> export
//! ```
//!
//! Every stage takes the previous mesh by value or reference and returns a
//! new one. Face and vertex counts after each stage are kept in the
//! [`PipelineOutcome`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, info_span, warn};

use bimprint_extract::{AcquisitionAdapter, GeometryKernel, ObjSceneKernel};
use bimprint_mesh::tracing_ext::OperationTimer;
use bimprint_mesh::{
    ExportFormat, Mesh, ValidationReport, ensure_watertight, export_mesh, log_mesh_stats,
    remove_non_finite_vertices, remove_unreferenced_vertices, scale_for_printer_with_factor,
    scale_units, simplify, smooth_surface, validate_for_printing,
};
use bimprint_voxel::{extract_envelope, thicken_walls_with_params};

use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::error::{PipelineError, PipelineResult};

/// Mesh size after one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub vertices: usize,
    pub faces: usize,
}

/// A processed mesh before export.
#[derive(Debug, Clone)]
pub struct ProcessedMesh {
    pub mesh: Mesh,
    /// Factor that brought the raw mesh to millimeters.
    pub unit_factor: f64,
    /// Factor applied to fit the printer volume, if configured.
    pub printer_factor: Option<f64>,
    pub stages: Vec<StageRecord>,
    pub report: ValidationReport,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub output_path: PathBuf,
    pub format: ExportFormat,
    pub bytes_written: u64,
    pub unit_factor: f64,
    pub printer_factor: Option<f64>,
    pub stages: Vec<StageRecord>,
    pub report: ValidationReport,
    /// Report meets the configured minimum thickness and is closed.
    pub printable: bool,
}

/// Runs the configured stages inside one [`RunContext`].
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    context: &'a RunContext,
    stages: Vec<StageRecord>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, context: &'a RunContext) -> Self {
        Self {
            config,
            context,
            stages: Vec::new(),
        }
    }

    /// Process the model at `model_path` and export it.
    ///
    /// `output` defaults to [`RunContext::default_output`] and `format` to the
    /// configured export format.
    pub fn run(
        self,
        model_path: &Path,
        output: Option<&Path>,
        format: Option<ExportFormat>,
    ) -> PipelineResult<PipelineOutcome> {
        self.run_with_kernel(ObjSceneKernel, model_path, output, format)
    }

    /// Same as [`run`](Self::run) with a caller-supplied geometry kernel.
    pub fn run_with_kernel<K: GeometryKernel>(
        mut self,
        kernel: K,
        model_path: &Path,
        output: Option<&Path>,
        format: Option<ExportFormat>,
    ) -> PipelineResult<PipelineOutcome> {
        let span = info_span!("pipeline_run", run_id = %self.context.run_id);
        let _enter = span.enter();
        let _timer = OperationTimer::new("pipeline");

        self.config.validate()?;
        self.context.prepare()?;
        info!(model = %model_path.display(), "Starting pipeline run");

        let mut adapter = AcquisitionAdapter::new(
            kernel,
            self.config.extraction_config(),
            self.context.work_dir(),
        );
        let raw = adapter.acquire(model_path)?;
        self.record("acquire", &raw);

        let processed = self.process_recorded(raw)?;

        let format = format.unwrap_or(self.config.export.format);
        let output_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.context.default_output(model_path, format));
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        let bytes_written = export_mesh(&processed.mesh, &output_path, format)?;

        let printable = processed
            .report
            .is_printable(self.config.optimize.min_thickness_mm);
        info!(
            output = %output_path.display(),
            bytes = bytes_written,
            printable,
            "Pipeline run complete"
        );

        Ok(PipelineOutcome {
            run_id: self.context.run_id.clone(),
            output_path,
            format,
            bytes_written,
            unit_factor: processed.unit_factor,
            printer_factor: processed.printer_factor,
            stages: processed.stages,
            report: processed.report,
            printable,
        })
    }

    /// Run every stage after acquisition on `raw`; no files are written.
    pub fn process(mut self, raw: Mesh) -> PipelineResult<ProcessedMesh> {
        self.config.validate()?;
        self.record("acquire", &raw);
        self.process_recorded(raw)
    }

    fn process_recorded(&mut self, mut raw: Mesh) -> PipelineResult<ProcessedMesh> {
        let config = self.config;

        // Unit detection and the voxel grid need finite bounds
        if raw.vertices.iter().any(|v| !v.is_finite()) {
            remove_non_finite_vertices(&mut raw);
            remove_unreferenced_vertices(&mut raw);
        }

        let units = config.units.resolve(&raw)?;
        let (mut mesh, unit_factor) = scale_units(&raw, units);
        drop(raw);
        self.record("normalize_units", &mesh);

        mesh = extract_envelope(&mesh, &config.envelope_params())?;
        self.record("envelope", &mesh);

        if let Some(level) = config.simplify {
            mesh = simplify(&mesh, level)?;
            self.record("simplify", &mesh);
        }

        if config.scale != 1.0 {
            mesh.scale(config.scale);
            info!(scale = config.scale, "Applied user scale");
            self.record("scale", &mesh);
        }

        let mut printer_factor = None;
        if let Some(printer) = &config.printer {
            let (scaled, factor) = scale_for_printer_with_factor(&mesh, printer.target_size_mm)?;
            mesh = scaled;
            printer_factor = Some(factor);
            self.record("printer_fit", &mesh);
        }

        mesh = ensure_watertight(&mesh)?;
        self.record("repair", &mesh);

        if config.optimize.thicken {
            let result = thicken_walls_with_params(&mesh, &config.thicken_params())?;
            mesh = result.mesh;
            self.record("thicken", &mesh);
        }

        if config.optimize.smooth_iterations > 0 {
            mesh = smooth_surface(&mesh, config.optimize.smooth_iterations)?;
            self.record("smooth", &mesh);
        }

        let report = validate_for_printing(&mesh, config.optimize.sample_count)?;
        if !report.is_watertight {
            warn!("Final mesh is not watertight");
        }
        if report.min_wall_thickness.value() < config.optimize.min_thickness_mm {
            warn!(
                measured = report.min_wall_thickness.value(),
                required = config.optimize.min_thickness_mm,
                "Walls thinner than required"
            );
        }

        Ok(ProcessedMesh {
            mesh,
            unit_factor,
            printer_factor,
            stages: std::mem::take(&mut self.stages),
            report,
        })
    }

    fn record(&mut self, stage: &str, mesh: &Mesh) {
        log_mesh_stats(mesh, stage);
        self.stages.push(StageRecord {
            stage: stage.to_string(),
            vertices: mesh.vertex_count(),
            faces: mesh.face_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrinterSettings;
    use bimprint_mesh::{PrinterVolume, UnitOverride, Vertex};

    fn create_box(x: f64, y: f64, z: f64) -> Mesh {
        let mut mesh = Mesh::new();
        for &(px, py, pz) in &[
            (0.0, 0.0, 0.0),
            (x, 0.0, 0.0),
            (x, y, 0.0),
            (0.0, y, 0.0),
            (0.0, 0.0, z),
            (x, 0.0, z),
            (x, y, z),
            (0.0, y, z),
        ] {
            mesh.vertices.push(Vertex::from_coords(px, py, pz));
        }
        mesh.faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        mesh
    }

    fn small_budget() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.optimize.max_voxels = 200_000;
        config.optimize.sample_count = 100;
        config
    }

    #[test]
    fn test_meter_model_is_scaled() {
        let config = small_budget();
        let ctx = RunContext::with_run_id("unused", "t1");
        let processed = Pipeline::new(&config, &ctx)
            .process(create_box(10.0, 8.0, 3.0))
            .unwrap();

        assert_eq!(processed.unit_factor, 1000.0);
        let extents = processed.mesh.extents().unwrap();
        assert!(extents.x >= 10_000.0);
        assert!(processed.report.is_watertight);

        let stages: Vec<&str> = processed.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["acquire", "normalize_units", "envelope", "repair", "thicken"]
        );
    }

    #[test]
    fn test_unit_override_and_printer_fit() {
        let mut config = small_budget();
        config.units = UnitOverride::Millimeters;
        config.printer = Some(PrinterSettings {
            target_size_mm: PrinterVolume::Cube(150.0),
        });
        config.optimize.thicken = false;

        let ctx = RunContext::with_run_id("unused", "t2");
        let processed = Pipeline::new(&config, &ctx)
            .process(create_box(600.0, 300.0, 150.0))
            .unwrap();

        assert_eq!(processed.unit_factor, 1.0);
        let factor = processed.printer_factor.unwrap();
        assert!(factor > 0.2 && factor < 0.3);
        assert!(processed.mesh.max_extent().unwrap() <= 150.0 + 1e-6);
    }

    #[test]
    fn test_invalid_config_fails_before_work() {
        let mut config = small_budget();
        config.optimize.min_thickness_mm = -1.0;
        let ctx = RunContext::with_run_id("unused", "t3");
        let err = Pipeline::new(&config, &ctx)
            .process(create_box(10.0, 10.0, 10.0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn test_non_finite_vertices_dropped_before_envelope() {
        let mut config = small_budget();
        config.units = UnitOverride::Millimeters;
        config.optimize.thicken = false;

        let mut raw = create_box(100.0, 80.0, 30.0);
        raw.vertices.push(Vertex::from_coords(f64::INFINITY, 0.0, 0.0));
        raw.vertices.push(Vertex::from_coords(0.0, f64::NAN, 0.0));
        raw.faces.push([0, 1, 8]);

        let ctx = RunContext::with_run_id("unused", "t5");
        let processed = Pipeline::new(&config, &ctx).process(raw).unwrap();

        let extents = processed.mesh.extents().unwrap();
        assert!(extents.iter().all(|e| e.is_finite()));
        assert!(extents.x >= 100.0 && extents.x < 110.0);
        assert!(processed.report.is_watertight);
    }

    #[test]
    fn test_empty_input() {
        let config = small_budget();
        let ctx = RunContext::with_run_id("unused", "t4");
        let err = Pipeline::new(&config, &ctx).process(Mesh::new()).unwrap_err();
        assert_eq!(err.detailed_code(), "MESH-2001");
    }
}
