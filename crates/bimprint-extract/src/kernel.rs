//! The geometry kernel seam.
//!
//! Parsing a building model and tessellating its elements is left to a
//! kernel behind [`GeometryKernel`]. The workspace ships [`ObjSceneKernel`]
//! for scenes that were already tessellated into one named OBJ object per
//! element.

use std::path::Path;

use bimprint_mesh::{Mesh, load_obj_objects};

use crate::error::ExtractResult;

/// Stable identity of an element inside one opened model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub String);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Triangulated geometry of one element, world coordinates.
#[derive(Debug, Clone, Default)]
pub struct RawGeometry {
    pub positions: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl RawGeometry {
    /// True when there is nothing to build a mesh from.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.faces.is_empty()
    }

    pub fn to_mesh(&self) -> Mesh {
        Mesh::from_buffers(&self.positions, &self.faces)
    }
}

impl From<&Mesh> for RawGeometry {
    fn from(mesh: &Mesh) -> Self {
        Self {
            positions: mesh
                .vertices
                .iter()
                .map(|v| [v.position.x, v.position.y, v.position.z])
                .collect(),
            faces: mesh.faces.clone(),
        }
    }
}

/// Reads a building model and tessellates its elements.
///
/// Per-element failures are reported as plain messages; the caller logs and
/// skips them.
pub trait GeometryKernel {
    type Model;

    /// Open and parse the model file.
    fn open(&self, path: &Path) -> ExtractResult<Self::Model>;

    /// Elements whose native type is exactly `type_name`.
    fn elements_of_type(&self, model: &Self::Model, type_name: &str) -> Vec<ElementId>;

    /// World-space triangles of one element.
    fn element_geometry(&self, model: &Self::Model, id: &ElementId) -> Result<RawGeometry, String>;
}

/// An OBJ scene whose objects are named `<IfcType>:<GlobalId>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjSceneKernel;

/// Objects of an opened OBJ scene.
#[derive(Debug, Clone, Default)]
pub struct ObjScene {
    objects: Vec<(String, Mesh)>,
}

impl ObjScene {
    pub fn new(objects: Vec<(String, Mesh)>) -> Self {
        Self { objects }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Native type of an object name: the part before the first `:`.
fn object_type(name: &str) -> &str {
    name.split_once(':').map_or(name, |(ty, _)| ty)
}

impl GeometryKernel for ObjSceneKernel {
    type Model = ObjScene;

    fn open(&self, path: &Path) -> ExtractResult<ObjScene> {
        Ok(ObjScene::new(load_obj_objects(path)?))
    }

    fn elements_of_type(&self, model: &ObjScene, type_name: &str) -> Vec<ElementId> {
        model
            .objects
            .iter()
            .filter(|(name, _)| object_type(name) == type_name)
            .map(|(name, _)| ElementId(name.clone()))
            .collect()
    }

    fn element_geometry(&self, model: &ObjScene, id: &ElementId) -> Result<RawGeometry, String> {
        // Objects sharing a name are parts of one element
        let mut parts = model.objects.iter().filter(|(name, _)| *name == id.0).peekable();
        if parts.peek().is_none() {
            return Err(format!("element {} not in scene", id));
        }
        let merged = Mesh::concatenate(parts.map(|(_, mesh)| mesh));
        Ok(RawGeometry::from(&merged))
    }
}
