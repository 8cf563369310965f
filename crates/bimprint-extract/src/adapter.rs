//! Acquisition: one raw combined mesh per building model.
//!
//! Two paths, chosen by [`ExtractionConfig::external`]:
//!
//! - **In-process**: categories are resolved to native types, matching
//!   elements are collected through a [`GeometryKernel`], and the
//!   per-element meshes are concatenated. Elements that fail to tessellate
//!   are logged and skipped.
//! - **External**: an [`ExtractorRunner`] produces the mesh. The executable
//!   chosen for a model is remembered until a different model comes in.

use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use tracing::{debug, info, warn};

use bimprint_mesh::Mesh;
use bimprint_mesh::tracing_ext::OperationTimer;

use crate::category::{normalize_categories, resolve_types};
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::kernel::{ElementId, GeometryKernel, ObjSceneKernel};
use crate::runner::ExtractorRunner;

/// Obtains the raw mesh of a model according to an [`ExtractionConfig`].
#[derive(Debug)]
pub struct AcquisitionAdapter<K = ObjSceneKernel> {
    kernel: K,
    config: ExtractionConfig,
    work_dir: PathBuf,
    /// `(model, executable)` of the last resolution.
    selected: Option<(PathBuf, PathBuf)>,
}

impl<K: GeometryKernel> AcquisitionAdapter<K> {
    /// `work_dir` receives the extractor configuration and output.
    pub fn new(kernel: K, config: ExtractionConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            kernel,
            config,
            work_dir: work_dir.into(),
            selected: None,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Executable remembered from the last external run, if any.
    pub fn cached_extractor(&self) -> Option<&Path> {
        self.selected.as_ref().map(|(_, exe)| exe.as_path())
    }

    /// Raw combined mesh of the model at `model_path`.
    ///
    /// # Errors
    ///
    /// Everything [`collect`](Self::collect) or the extractor runner can
    /// return, depending on the configured path.
    pub fn acquire(&mut self, model_path: &Path) -> ExtractResult<Mesh> {
        match self.config.external.clone() {
            Some(external) => {
                let exe = self.resolve_extractor(model_path)?;
                ExtractorRunner::new(external, &self.work_dir).extract(model_path, &exe)
            }
            None => self.collect(model_path),
        }
    }

    /// Executable for `model_path`, resolved once per model.
    pub fn resolve_extractor(&mut self, model_path: &Path) -> ExtractResult<PathBuf> {
        if let Some((model, exe)) = &self.selected
            && model == model_path
        {
            debug!(exe = %exe.display(), "Reusing selected extractor");
            return Ok(exe.clone());
        }

        let external = self.config.external.clone().ok_or_else(|| {
            ExtractError::extractor_not_found(PathBuf::new(), "no external extractor configured")
        })?;
        let exe = ExtractorRunner::new(external, &self.work_dir).resolve_executable(model_path)?;
        self.selected = Some((model_path.to_path_buf(), exe.clone()));
        Ok(exe)
    }

    /// In-process collection over the category whitelist.
    pub fn collect(&self, model_path: &Path) -> ExtractResult<Mesh> {
        let model = self.kernel.open(model_path)?;
        self.collect_from(&model)
    }

    /// In-process collection from an already opened model.
    ///
    /// # Errors
    ///
    /// [`ExtractError::NoGeometryExtracted`] when no element survives.
    pub fn collect_from(&self, model: &K::Model) -> ExtractResult<Mesh> {
        let _timer = OperationTimer::new("collect_geometry");

        let (include, exclude) = normalize_categories(&self.config.include, &self.config.exclude);
        let included = self.elements_of(model, &resolve_types(&include));
        let excluded: HashSet<ElementId> =
            self.elements_of(model, &resolve_types(&exclude)).into_iter().collect();

        let elements: Vec<ElementId> = included
            .iter()
            .filter(|id| !excluded.contains(*id))
            .cloned()
            .collect();

        info!(
            included = included.len(),
            excluded = excluded.len(),
            result = elements.len(),
            "Filtered elements"
        );

        let mut meshes = Vec::with_capacity(elements.len());
        for id in &elements {
            match self.kernel.element_geometry(model, id) {
                Ok(geometry) if geometry.is_empty() => {
                    warn!(element = %id, "Element has no geometry, skipping");
                }
                Ok(geometry) => meshes.push(geometry.to_mesh()),
                Err(reason) => {
                    warn!(element = %id, %reason, "Failed to extract element geometry, skipping");
                }
            }
        }

        if meshes.is_empty() {
            return Err(ExtractError::NoGeometryExtracted { include });
        }

        let combined = Mesh::concatenate(&meshes);
        info!(
            elements = meshes.len(),
            vertices = combined.vertex_count(),
            faces = combined.face_count(),
            "Combined element geometry"
        );
        Ok(combined)
    }

    /// Elements of any of `types`, deduplicated, first occurrence order.
    fn elements_of(&self, model: &K::Model, types: &[String]) -> Vec<ElementId> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for ty in types {
            for id in self.kernel.elements_of_type(model, ty) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalExtractorConfig;
    use crate::kernel::{ObjScene, RawGeometry};
    use bimprint_mesh::Vertex;
    use tempfile::TempDir;

    fn quad(x: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(x, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(x + 1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(x + 1.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(x, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 2, 3]);
        mesh
    }

    fn scene() -> ObjScene {
        ObjScene::new(vec![
            ("IfcWall:w1".to_string(), quad(0.0)),
            ("IfcWallStandardCase:w2".to_string(), quad(2.0)),
            ("IfcSlab:s1".to_string(), quad(4.0)),
            ("IfcFurnishingElement:f1".to_string(), quad(6.0)),
            ("IfcRoof:empty".to_string(), Mesh::new()),
        ])
    }

    fn adapter(include: &[&str], exclude: &[&str]) -> AcquisitionAdapter {
        let config = ExtractionConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        AcquisitionAdapter::new(ObjSceneKernel, config, "work")
    }

    #[test]
    fn test_collect_mapped_categories() {
        let mesh = adapter(&["OST_Walls", "IfcSlab"], &[])
            .collect_from(&scene())
            .unwrap();
        assert_eq!(mesh.face_count(), 6);
    }

    #[test]
    fn test_overlapping_categories_dedup() {
        // IfcWall is reached through both names but collected once
        let mesh = adapter(&["OST_Walls", "IfcWall"], &[]).collect_from(&scene()).unwrap();
        assert_eq!(mesh.face_count(), 4);
    }

    #[test]
    fn test_exclude_removes_elements() {
        let mesh = adapter(&["OST_Walls"], &["IfcWallStandardCase"])
            .collect_from(&scene())
            .unwrap();
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_include_wins_over_exclude() {
        let mesh = adapter(&["IfcSlab"], &["IfcSlab"]).collect_from(&scene()).unwrap();
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_empty_elements_skipped() {
        let mesh = adapter(&["IfcRoof", "IfcSlab"], &[]).collect_from(&scene()).unwrap();
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_nothing_survives() {
        let err = adapter(&["IfcRoof", "IfcBeam"], &[])
            .collect_from(&scene())
            .unwrap_err();
        match err {
            ExtractError::NoGeometryExtracted { include } => {
                assert_eq!(include, vec!["IfcRoof".to_string(), "IfcBeam".to_string()]);
            }
            other => panic!("Expected NoGeometryExtracted, got {other:?}"),
        }
    }

    struct FailingKernel;

    impl GeometryKernel for FailingKernel {
        type Model = ();

        fn open(&self, _path: &Path) -> ExtractResult<()> {
            Ok(())
        }

        fn elements_of_type(&self, _model: &(), type_name: &str) -> Vec<ElementId> {
            vec![
                ElementId(format!("{type_name}:ok")),
                ElementId(format!("{type_name}:broken")),
            ]
        }

        fn element_geometry(&self, _model: &(), id: &ElementId) -> Result<RawGeometry, String> {
            if id.0.ends_with("broken") {
                Err("tessellation failed".to_string())
            } else {
                Ok(RawGeometry::from(&quad(0.0)))
            }
        }
    }

    #[test]
    fn test_failing_elements_skipped() {
        let config = ExtractionConfig {
            include: vec!["IfcWall".to_string()],
            ..Default::default()
        };
        let adapter = AcquisitionAdapter::new(FailingKernel, config, "work");
        let mesh = adapter.collect(Path::new("model.ifc")).unwrap();
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_extractor_memoized_per_model() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("extractor");
        std::fs::write(&exe, b"").unwrap();

        let config = ExtractionConfig {
            external: Some(ExternalExtractorConfig::new(&exe)),
            ..Default::default()
        };
        let mut adapter = AcquisitionAdapter::new(ObjSceneKernel, config, dir.path());
        assert!(adapter.cached_extractor().is_none());

        let first = adapter.resolve_extractor(Path::new("a.ifc")).unwrap();
        assert_eq!(first, exe);
        assert_eq!(adapter.cached_extractor(), Some(exe.as_path()));

        // The executable disappears; the cached selection still serves a.ifc
        std::fs::remove_file(&exe).unwrap();
        assert_eq!(adapter.resolve_extractor(Path::new("a.ifc")).unwrap(), exe);

        // A new model resolves again and fails
        let err = adapter.resolve_extractor(Path::new("b.ifc")).unwrap_err();
        assert!(matches!(err, ExtractError::ExtractorNotFound { .. }));
    }
}
