//! Envelope extraction: reduce a building's raw geometry to its outer shell.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bimprint_mesh::tracing_ext::OperationTimer;
use bimprint_mesh::{Mesh, MeshError, fix_winding_order, remove_unreferenced_vertices};

use crate::error::{VoxelError, VoxelResult};
use crate::grid::{DEFAULT_MAX_VOXELS, VoxelGrid, resolve_pitch};
use crate::polygonize::polygonize;

/// Envelope pitch is the largest extent divided by this, but never below
/// [`MIN_ENVELOPE_PITCH`].
pub const ENVELOPE_RESOLUTION: f64 = 200.0;

/// Smallest automatic envelope pitch in mesh units.
pub const MIN_ENVELOPE_PITCH: f64 = 1.0;

/// How the outer shell is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMethod {
    /// Voxelize, fill the interior and polygonize the boundary.
    #[default]
    Voxel,
    /// Convex hull of all vertices.
    ConvexHull,
}

impl fmt::Display for EnvelopeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeMethod::Voxel => write!(f, "voxel"),
            EnvelopeMethod::ConvexHull => write!(f, "convex_hull"),
        }
    }
}

impl FromStr for EnvelopeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voxel" | "voxels" => Ok(EnvelopeMethod::Voxel),
            "convex_hull" | "convex-hull" | "hull" => Ok(EnvelopeMethod::ConvexHull),
            other => Err(format!("unknown envelope method {other:?}")),
        }
    }
}

/// Parameters for [`extract_envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    pub method: EnvelopeMethod,
    /// Explicit voxel pitch. `None` uses `max(E / 200, 1)`.
    pub voxel_pitch: Option<f64>,
    /// Upper bound on grid size.
    pub max_voxels: usize,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            method: EnvelopeMethod::Voxel,
            voxel_pitch: None,
            max_voxels: DEFAULT_MAX_VOXELS,
        }
    }
}

impl EnvelopeParams {
    /// Convex hull envelope.
    pub fn convex_hull() -> Self {
        Self {
            method: EnvelopeMethod::ConvexHull,
            ..Default::default()
        }
    }

    /// Voxel envelope at a fixed pitch.
    pub fn voxel(pitch: f64) -> Self {
        Self {
            voxel_pitch: Some(pitch),
            ..Default::default()
        }
    }
}

/// Automatic pitch for a mesh: `max(E / 200, 1)`.
pub fn default_envelope_pitch(mesh: &Mesh) -> f64 {
    (mesh.max_extent().unwrap_or(0.0) / ENVELOPE_RESOLUTION).max(MIN_ENVELOPE_PITCH)
}

/// Reduce `mesh` to its external shell.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] for a mesh without faces.
/// - [`VoxelError::GridTooLarge`] when an explicit pitch exceeds the budget.
/// - [`VoxelError::HullFailed`] when the hull cannot be built.
/// - [`VoxelError::EmptyIsosurface`] when the voxel solid is empty.
pub fn extract_envelope(mesh: &Mesh, params: &EnvelopeParams) -> VoxelResult<Mesh> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot extract the envelope of an empty mesh").into());
    }
    let _timer = OperationTimer::with_mesh("extract_envelope", mesh);

    let envelope = match params.method {
        EnvelopeMethod::ConvexHull => convex_hull(mesh)?,
        EnvelopeMethod::Voxel => voxel_shell(mesh, params.voxel_pitch, params.max_voxels)?,
    };

    info!(
        method = %params.method,
        faces_in = mesh.face_count(),
        faces_out = envelope.face_count(),
        "Envelope extracted"
    );
    Ok(envelope)
}

/// Keep only the outer boundary of `mesh`, dropping interior walls, floors
/// and furniture, with the automatic envelope pitch.
pub fn remove_internal_geometry(mesh: &Mesh) -> VoxelResult<Mesh> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot remove internal geometry of an empty mesh").into());
    }
    let _timer = OperationTimer::with_mesh("remove_internal_geometry", mesh);
    voxel_shell(mesh, None, DEFAULT_MAX_VOXELS)
}

/// Voxelize, fill and polygonize.
fn voxel_shell(mesh: &Mesh, pitch: Option<f64>, max_voxels: usize) -> VoxelResult<Mesh> {
    let pitch = resolve_pitch(mesh, pitch, default_envelope_pitch(mesh), 1, max_voxels)?;

    let mut grid = VoxelGrid::voxelize(mesh, pitch, 1, max_voxels)?;
    let filled = grid.fill();
    if filled == 0 {
        warn!(
            pitch,
            "Voxel fill found no enclosed interior, the surface may have gaps wider than the pitch"
        );
    }

    polygonize(&grid)
}

/// Convex hull of every vertex, wound outward.
fn convex_hull(mesh: &Mesh) -> VoxelResult<Mesh> {
    use chull::ConvexHullWrapper;

    let extents = mesh
        .extents()
        .ok_or_else(|| MeshError::empty_mesh("mesh has no vertices"))?;
    if extents.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
        return Err(VoxelError::hull_failed(format!(
            "input is flat or unbounded: extents {:.3} x {:.3} x {:.3}",
            extents.x, extents.y, extents.z
        )));
    }

    let points: Vec<Vec<f64>> = mesh
        .vertices
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| vec![v.position.x, v.position.y, v.position.z])
        .collect();

    let hull = ConvexHullWrapper::try_new(&points, None)
        .map_err(|e| VoxelError::hull_failed(format!("{e:?}")))?;
    let (verts, indices) = hull.vertices_indices();

    let positions: Vec<[f64; 3]> = verts.iter().map(|v| [v[0], v[1], v[2]]).collect();
    let faces: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
        .collect();

    let mut hull_mesh = Mesh::from_buffers(&positions, &faces);
    if hull_mesh.is_empty() {
        return Err(VoxelError::hull_failed("hull has no faces"));
    }
    remove_unreferenced_vertices(&mut hull_mesh);
    fix_winding_order(&mut hull_mesh);

    Ok(hull_mesh)
}
