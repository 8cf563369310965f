//! Hole detection and filling.
//!
//! Boundary loops are traced along directed half-edges so that each loop runs
//! opposite to the faces bordering it. Triangles cut from a loop in loop
//! order therefore share the winding of the surrounding surface.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::adjacency::{MeshAdjacency, normalize_edge};
use crate::{Mesh, Triangle};

/// Holes with more edges than this are left open by [`fill_holes`].
pub const DEFAULT_MAX_HOLE_EDGES: usize = 100;

/// A boundary loop representing a hole in the mesh.
#[derive(Debug, Clone)]
pub struct BoundaryLoop {
    /// Ordered list of vertex indices forming the loop.
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Detect all boundary loops (holes) in the mesh.
pub fn detect_holes(mesh: &Mesh, adjacency: &MeshAdjacency) -> Vec<BoundaryLoop> {
    let boundary: HashSet<(u32, u32)> = adjacency.boundary_edges().collect();
    if boundary.is_empty() {
        return Vec::new();
    }

    debug!(boundary_edges = boundary.len(), "Tracing boundary loops");

    // Each boundary edge belongs to one face; the hole walks it backwards.
    let mut next: HashMap<u32, Vec<u32>> = HashMap::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let a = face[i];
            let b = face[(i + 1) % 3];
            if boundary.contains(&normalize_edge(a, b)) {
                next.entry(b).or_default().push(a);
            }
        }
    }

    let mut used: HashSet<(u32, u32)> = HashSet::new();
    let mut loops = Vec::new();

    let mut starts: Vec<u32> = next.keys().copied().collect();
    starts.sort_unstable();

    for start in starts {
        loop {
            let Some(first) = take_unused(&next, &used, start) else {
                break;
            };

            let mut loop_vertices = vec![start];
            let mut current = first;
            used.insert((start, first));
            let mut closed = false;

            while loop_vertices.len() <= boundary.len() {
                if current == start {
                    closed = true;
                    break;
                }
                loop_vertices.push(current);
                match take_unused(&next, &used, current) {
                    Some(n) => {
                        used.insert((current, n));
                        current = n;
                    }
                    None => break,
                }
            }

            if closed && loop_vertices.len() >= 3 {
                loops.push(BoundaryLoop {
                    vertices: loop_vertices,
                });
            } else if !closed {
                warn!(start, "Boundary loop is not closed");
            }
        }
    }

    info!(
        holes = loops.len(),
        sizes = ?loops.iter().map(BoundaryLoop::edge_count).collect::<Vec<_>>(),
        "Detected holes"
    );

    loops
}

fn take_unused(
    next: &HashMap<u32, Vec<u32>>,
    used: &HashSet<(u32, u32)>,
    from: u32,
) -> Option<u32> {
    next.get(&from)?
        .iter()
        .copied()
        .find(|&to| !used.contains(&(from, to)))
}

/// Fill a hole using ear clipping triangulation, falling back to a fan.
///
/// Returns the new triangles to add to the mesh.
pub fn fill_hole_ear_clipping(mesh: &Mesh, boundary: &BoundaryLoop) -> Vec<[u32; 3]> {
    let n = boundary.vertices.len();
    if n < 3 {
        return Vec::new();
    }

    let positions: Vec<Point3<f64>> = boundary
        .vertices
        .iter()
        .map(|&idx| mesh.vertices[idx as usize].position)
        .collect();

    let centroid = Point3::from(
        positions.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n as f64,
    );
    let hole_normal = compute_hole_normal(&positions, &centroid);

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let next = remaining[(i + 1) % len];
            is_ear(&positions, &remaining, prev, remaining[i], next, &hole_normal)
        });

        let Some(i) = ear else {
            warn!(
                remaining = remaining.len(),
                "Ear clipping stuck, using fan triangulation"
            );
            break;
        };

        let prev = remaining[(i + len - 1) % len];
        let next = remaining[(i + 1) % len];
        triangles.push([
            boundary.vertices[prev],
            boundary.vertices[remaining[i]],
            boundary.vertices[next],
        ]);
        remaining.remove(i);
    }

    for i in 1..remaining.len().saturating_sub(1) {
        triangles.push([
            boundary.vertices[remaining[0]],
            boundary.vertices[remaining[i]],
            boundary.vertices[remaining[i + 1]],
        ]);
    }

    debug!(
        edges = n,
        triangles = triangles.len(),
        "Filled hole"
    );

    triangles
}

/// Compute the average normal for a hole boundary.
fn compute_hole_normal(positions: &[Point3<f64>], centroid: &Point3<f64>) -> Vector3<f64> {
    let n = positions.len();
    let normal: Vector3<f64> = (0..n)
        .map(|i| (positions[i] - centroid).cross(&(positions[(i + 1) % n] - centroid)))
        .sum();

    normal
        .try_normalize(f64::EPSILON)
        .unwrap_or_else(Vector3::z)
}

/// Check if vertex at index `curr` forms a valid ear.
fn is_ear(
    positions: &[Point3<f64>],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    hole_normal: &Vector3<f64>,
) -> bool {
    let p_prev = positions[prev];
    let p_curr = positions[curr];
    let p_next = positions[next];

    let Some(tri_normal) = Triangle::new(p_prev, p_curr, p_next).normal() else {
        return false;
    };

    // Reflex corner
    if tri_normal.dot(hole_normal) < 0.0 {
        return false;
    }

    !remaining.iter().any(|&idx| {
        idx != prev
            && idx != curr
            && idx != next
            && point_in_triangle_projected(&positions[idx], &p_prev, &p_curr, &p_next, hole_normal)
    })
}

/// Point-in-triangle test after dropping the axis most aligned with `normal`.
fn point_in_triangle_projected(
    p: &Point3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let abs = normal.abs();
    let project = |q: &Point3<f64>| -> (f64, f64) {
        if abs.z >= abs.x && abs.z >= abs.y {
            (q.x, q.y)
        } else if abs.y >= abs.x {
            (q.x, q.z)
        } else {
            (q.y, q.z)
        }
    };

    let (p, a, b, c) = (project(p), project(v0), project(v1), project(v2));
    let sign = |p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)| -> f64 {
        (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1)
    };

    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;

    !(has_neg && has_pos)
}

/// Fill holes of up to [`DEFAULT_MAX_HOLE_EDGES`] edges.
///
/// Returns the number of holes filled.
pub fn fill_holes(mesh: &mut Mesh) -> usize {
    fill_holes_with_max_edges(mesh, DEFAULT_MAX_HOLE_EDGES)
}

/// Fill all holes with at most `max_hole_edges` edges.
///
/// Each hole is triangulated independently in parallel, then merged. A
/// three-edge hole bounded by a single existing triangle is an isolated
/// face, not a hole, and is left alone.
pub fn fill_holes_with_max_edges(mesh: &mut Mesh, max_hole_edges: usize) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let holes = detect_holes(mesh, &adjacency);
    if holes.is_empty() {
        return 0;
    }

    let existing: HashSet<[u32; 3]> = mesh.faces.iter().map(|f| sorted(*f)).collect();

    let (fillable, skipped): (Vec<_>, Vec<_>) = holes.into_iter().partition(|hole| {
        hole.edge_count() <= max_hole_edges
            && !(hole.edge_count() == 3
                && existing.contains(&sorted([
                    hole.vertices[0],
                    hole.vertices[1],
                    hole.vertices[2],
                ])))
    });

    for hole in skipped.iter().filter(|h| h.edge_count() > max_hole_edges) {
        warn!(
            edges = hole.edge_count(),
            max = max_hole_edges,
            "Skipping large hole"
        );
    }

    let patches: Vec<Vec<[u32; 3]>> = fillable
        .par_iter()
        .map(|hole| fill_hole_ear_clipping(mesh, hole))
        .collect();

    let filled = patches.iter().filter(|p| !p.is_empty()).count();
    for patch in patches {
        mesh.faces.extend(patch);
    }

    if filled > 0 {
        info!(holes_filled = filled, "Filled holes");
    }
    filled
}

#[inline]
fn sorted(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn open_box_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (10.0, 0.0, 0.0),
            (10.0, 10.0, 0.0),
            (0.0, 10.0, 0.0),
            (0.0, 0.0, 10.0),
            (10.0, 0.0, 10.0),
            (10.0, 10.0, 10.0),
            (0.0, 10.0, 10.0),
        ] {
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
        // Closed cube minus the top face
        mesh.faces = vec![
            [0, 2, 1],
            [0, 3, 2],
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

    #[test]
    fn test_detect_single_hole() {
        let mesh = open_box_mesh();
        let adjacency = MeshAdjacency::build(&mesh.faces);
        let holes = detect_holes(&mesh, &adjacency);
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].edge_count(), 4);
    }

    #[test]
    fn test_fill_closes_mesh_with_outward_winding() {
        let mut mesh = open_box_mesh();
        let filled = fill_holes(&mut mesh);
        assert_eq!(filled, 1);
        assert_eq!(mesh.face_count(), 12);

        let adjacency = MeshAdjacency::build(&mesh.faces);
        assert!(adjacency.is_watertight());
        assert!(mesh.signed_volume() > 0.0);
        approx::assert_relative_eq!(mesh.signed_volume(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_isolated_triangle_is_not_filled() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);

        assert_eq!(fill_holes(&mut mesh), 0);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_large_hole_skipped() {
        let mut mesh = open_box_mesh();
        assert_eq!(fill_holes_with_max_edges(&mut mesh, 3), 0);
        assert_eq!(mesh.face_count(), 10);
    }
}
