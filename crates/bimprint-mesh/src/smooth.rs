//! Laplacian surface smoothing.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::info;

use crate::Mesh;
use crate::error::{MeshError, MeshResult};

/// Fraction of the way each vertex moves toward its neighbour centroid per
/// iteration.
pub const DEFAULT_SMOOTHING_STRENGTH: f64 = 0.5;

/// Smooth `mesh` with `iterations` passes of the umbrella operator.
///
/// # Errors
///
/// [`MeshError::InvalidParameter`] when `iterations` is zero.
pub fn smooth_surface(mesh: &Mesh, iterations: u32) -> MeshResult<Mesh> {
    smooth_surface_with_strength(mesh, iterations, DEFAULT_SMOOTHING_STRENGTH)
}

/// Like [`smooth_surface`] with an explicit step size in `(0, 1]`.
pub fn smooth_surface_with_strength(mesh: &Mesh, iterations: u32, strength: f64) -> MeshResult<Mesh> {
    if iterations == 0 {
        return Err(MeshError::invalid_parameter(
            "iterations",
            iterations,
            "smoothing needs at least one iteration",
        ));
    }
    if !(strength > 0.0 && strength <= 1.0) {
        return Err(MeshError::invalid_parameter(
            "strength",
            strength,
            "smoothing strength must be in (0, 1]",
        ));
    }

    let neighbors = vertex_neighbors(mesh);
    let mut out = mesh.clone();

    for _ in 0..iterations {
        let displacements = laplacian_displacements(&out, &neighbors, strength);
        for (v, d) in out.vertices.iter_mut().zip(displacements) {
            v.position += d;
        }
    }
    for v in &mut out.vertices {
        v.normal = None;
    }

    info!(iterations, strength, vertices = out.vertex_count(), "Smoothed surface");
    Ok(out)
}

/// Unique edge neighbours of every vertex.
fn vertex_neighbors(mesh: &Mesh) -> Vec<Vec<u32>> {
    let mut neighbors = vec![Vec::new(); mesh.vertices.len()];
    for face in &mesh.faces {
        for i in 0..3 {
            let (a, b) = (face[i], face[(i + 1) % 3]);
            neighbors[a as usize].push(b);
            neighbors[b as usize].push(a);
        }
    }
    for list in &mut neighbors {
        list.sort_unstable();
        list.dedup();
    }
    neighbors
}

fn laplacian_displacements(mesh: &Mesh, neighbors: &[Vec<u32>], strength: f64) -> Vec<Vector3<f64>> {
    mesh.vertices
        .par_iter()
        .zip(neighbors.par_iter())
        .map(|(v, ns)| {
            if ns.is_empty() {
                return Vector3::zeros();
            }
            let centroid = Point3::from(
                ns.iter()
                    .map(|&n| mesh.vertices[n as usize].position.coords)
                    .sum::<Vector3<f64>>()
                    / ns.len() as f64,
            );
            (centroid - v.position) * strength
        })
        .collect()
}
