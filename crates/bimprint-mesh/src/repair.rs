//! Mesh repair operations: degenerate removal, compaction, watertight closing.

use hashbrown::{HashMap, HashSet};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::holes::{DEFAULT_MAX_HOLE_EDGES, fill_holes_with_max_edges};
use crate::winding::fix_winding_order;
use crate::{Mesh, Triangle};

/// Configuration for [`ensure_watertight_with_params`].
///
/// ```
/// use bimprint_mesh::WatertightParams;
///
/// let params = WatertightParams {
///     fill_holes: false,
///     ..Default::default()
/// };
/// assert!(params.fix_winding);
/// ```
#[derive(Debug, Clone)]
pub struct WatertightParams {
    /// Faces with area at or below this are removed.
    ///
    /// Default: `1e-12`
    pub degenerate_area_threshold: f64,

    /// Reorient faces so every component is consistent and points outward.
    ///
    /// Default: `true`
    pub fix_winding: bool,

    /// Close boundary loops with ear clipping.
    ///
    /// Default: `true`
    pub fill_holes: bool,

    /// Holes with more edges than this stay open.
    ///
    /// Default: `100`
    pub max_hole_edges: usize,
}

impl Default for WatertightParams {
    fn default() -> Self {
        Self {
            degenerate_area_threshold: 1e-12,
            fix_winding: true,
            fill_holes: true,
            max_hole_edges: DEFAULT_MAX_HOLE_EDGES,
        }
    }
}

/// What a watertight pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    pub degenerate_faces_removed: usize,
    pub duplicate_faces_removed: usize,
    pub non_finite_faces_removed: usize,
    pub vertices_removed: usize,
    pub faces_flipped: usize,
    pub holes_filled: usize,
    pub is_watertight: bool,
}

/// Remove triangles with area at or below `area_threshold`.
///
/// Faces whose area is not a number (non-finite corners) and faces with an
/// out-of-range index are removed too. Returns the number removed.
pub fn remove_degenerate_faces(mesh: &mut Mesh, area_threshold: f64) -> usize {
    let original_count = mesh.faces.len();
    let vertex_count = mesh.vertices.len();
    let vertices = &mesh.vertices;

    mesh.faces.retain(|&[i0, i1, i2]| {
        if [i0, i1, i2].iter().any(|&i| i as usize >= vertex_count) {
            return false;
        }
        if i0 == i1 || i1 == i2 || i0 == i2 {
            return false;
        }
        let tri = Triangle::new(
            vertices[i0 as usize].position,
            vertices[i1 as usize].position,
            vertices[i2 as usize].position,
        );
        tri.area() > area_threshold
    });

    let removed = original_count - mesh.faces.len();
    if removed > 0 {
        info!(removed, "Removed degenerate faces");
    }
    removed
}

/// Remove duplicate faces from the mesh.
///
/// Faces are duplicates if they use the same three vertices regardless of
/// winding or starting vertex. The first occurrence is kept.
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    let original_count = mesh.faces.len();

    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(original_count);
    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });

    let removed = original_count - mesh.faces.len();
    if removed > 0 {
        info!(removed, "Removed duplicate faces");
    }
    removed
}

/// Remove every face that touches a vertex with a NaN or infinite coordinate.
///
/// The offending vertices become unreferenced and are dropped by
/// [`remove_unreferenced_vertices`].
pub fn remove_non_finite_vertices(mesh: &mut Mesh) -> usize {
    let bad: HashSet<u32> = mesh
        .vertices
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_finite())
        .map(|(i, _)| i as u32)
        .collect();

    if bad.is_empty() {
        return 0;
    }

    let original_count = mesh.faces.len();
    mesh.faces
        .retain(|face| !face.iter().any(|i| bad.contains(i)));

    let removed = original_count - mesh.faces.len();
    warn!(
        vertices = bad.len(),
        faces_removed = removed,
        "Removed faces touching non-finite vertices"
    );
    removed
}

/// Remove unreferenced vertices and compact the vertex array.
///
/// Returns the number of vertices removed.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let original_count = mesh.vertices.len();

    let mut referenced = vec![false; original_count];
    for face in &mesh.faces {
        for &i in face {
            if let Some(slot) = referenced.get_mut(i as usize) {
                *slot = true;
            }
        }
    }

    if referenced.iter().all(|&r| r) {
        return 0;
    }

    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut new_vertices = Vec::with_capacity(original_count);
    for (old_idx, vertex) in mesh.vertices.iter().enumerate() {
        if referenced[old_idx] {
            remap.insert(old_idx as u32, new_vertices.len() as u32);
            new_vertices.push(vertex.clone());
        }
    }

    for face in &mut mesh.faces {
        for i in face.iter_mut() {
            // Faces only reference kept vertices.
            *i = remap.get(i).copied().unwrap_or(*i);
        }
    }

    let removed = original_count - new_vertices.len();
    mesh.vertices = new_vertices;

    if removed > 0 {
        debug!(removed, "Removed unreferenced vertices");
    }
    removed
}

/// Compute vertex normals as area-weighted average of adjacent face normals.
pub fn compute_vertex_normals(mesh: &mut Mesh) {
    let mut accum: Vec<Vector3<f64>> = vec![Vector3::zeros(); mesh.vertices.len()];

    for tri_face in &mesh.faces {
        let tri = Triangle::new(
            mesh.vertices[tri_face[0] as usize].position,
            mesh.vertices[tri_face[1] as usize].position,
            mesh.vertices[tri_face[2] as usize].position,
        );
        // Length is twice the area.
        let weighted = tri.normal_unnormalized();
        for &i in tri_face {
            accum[i as usize] += weighted;
        }
    }

    for (vertex, n) in mesh.vertices.iter_mut().zip(accum) {
        vertex.normal = n.try_normalize(f64::EPSILON);
    }
}

/// Repair `mesh` toward a closed, outward-facing solid with default params.
///
/// See [`ensure_watertight_with_params`].
pub fn ensure_watertight(mesh: &Mesh) -> MeshResult<Mesh> {
    ensure_watertight_with_params(mesh, &WatertightParams::default()).map(|(out, _)| out)
}

/// Repair `mesh` toward a closed, outward-facing solid.
///
/// Steps run in a fixed order: degenerate faces, duplicate faces, non-finite
/// vertices, orphan vertices, winding, hole filling. A mesh that is still
/// open afterwards is returned with a warning rather than an error.
///
/// # Errors
///
/// [`MeshError::EmptyMesh`] when the input has no faces, or when cleanup
/// removes every face.
pub fn ensure_watertight_with_params(
    mesh: &Mesh,
    params: &WatertightParams,
) -> MeshResult<(Mesh, RepairStats)> {
    if mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh("cannot repair a mesh without faces"));
    }

    let mut out = mesh.clone();
    let mut stats = RepairStats::default();

    let initial_faces = out.face_count();
    let initial_verts = out.vertex_count();

    stats.degenerate_faces_removed =
        remove_degenerate_faces(&mut out, params.degenerate_area_threshold);
    stats.duplicate_faces_removed = remove_duplicate_faces(&mut out);
    stats.non_finite_faces_removed = remove_non_finite_vertices(&mut out);
    stats.vertices_removed = remove_unreferenced_vertices(&mut out);

    if out.faces.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "all {initial_faces} faces were degenerate, duplicated or non-finite"
        )));
    }

    if params.fix_winding {
        stats.faces_flipped = fix_winding_order(&mut out).faces_flipped;
    }

    if params.fill_holes {
        stats.holes_filled = fill_holes_with_max_edges(&mut out, params.max_hole_edges);
    }

    stats.is_watertight = MeshAdjacency::build(&out.faces).is_watertight();
    if !stats.is_watertight {
        let adjacency = MeshAdjacency::build(&out.faces);
        warn!(
            boundary_edges = adjacency.boundary_edge_count(),
            non_manifold_edges = adjacency.non_manifold_edge_count(),
            "Mesh is not watertight after repair"
        );
    }

    info!(
        vertices_before = initial_verts,
        vertices_after = out.vertex_count(),
        faces_before = initial_faces,
        faces_after = out.face_count(),
        watertight = stats.is_watertight,
        "Watertight repair complete"
    );

    Ok((out, stats))
}
