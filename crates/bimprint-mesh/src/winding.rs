//! Normal consistency and winding order correction.

use hashbrown::HashSet;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::Mesh;
use crate::adjacency::{MeshAdjacency, edge_direction_in_face, normalize_edge};

/// Summary of a winding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindingStats {
    /// Edge-connected face components.
    pub components: usize,
    /// Faces flipped to agree with their neighbours.
    pub faces_flipped: usize,
    /// Components flipped as a whole so their normals point outward.
    pub components_inverted: usize,
}

/// Make every edge-connected component consistently wound with outward normals.
///
/// Each component is flood-filled breadth first from its lowest face index; a
/// neighbour that traverses a shared edge in the same direction as the current
/// face is flipped. Once consistent, a component whose signed volume is
/// negative is turned inside out.
pub fn fix_winding_order(mesh: &mut Mesh) -> WindingStats {
    let mut stats = WindingStats::default();
    if mesh.faces.is_empty() {
        return stats;
    }

    let components = orient_components(mesh, &mut stats);

    for component in &components {
        if component_signed_volume(mesh, component) < 0.0 {
            for &face_idx in component {
                mesh.faces[face_idx].swap(1, 2);
            }
            stats.components_inverted += 1;
        }
    }

    if stats.faces_flipped > 0 || stats.components_inverted > 0 {
        info!(
            faces_flipped = stats.faces_flipped,
            components = stats.components,
            components_inverted = stats.components_inverted,
            "Fixed winding order"
        );
    } else {
        debug!(
            components = stats.components,
            "Winding order already consistent"
        );
    }

    stats
}

/// Flood-fill each component, flipping faces into agreement.
///
/// Returns the face indices of every component.
fn orient_components(mesh: &mut Mesh, stats: &mut WindingStats) -> Vec<Vec<usize>> {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();

    let mut visited = vec![false; face_count];
    let mut components = Vec::new();

    for start in 0..face_count {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(face_idx) = queue.pop_front() {
            component.push(face_idx);
            // Flips are applied in place, so the face is already final here.
            let face = mesh.faces[face_idx];

            for i in 0..3 {
                let v0 = face[i];
                let v1 = face[(i + 1) % 3];
                let Some(neighbors) = adjacency.faces_for_edge(v0, v1) else {
                    continue;
                };

                for &neighbor in neighbors {
                    if visited[neighbor] {
                        continue;
                    }
                    visited[neighbor] = true;

                    if edge_direction_in_face(&mesh.faces[neighbor], v0, v1) == Some(true) {
                        mesh.faces[neighbor].swap(1, 2);
                        stats.faces_flipped += 1;
                    }
                    queue.push_back(neighbor);
                }
            }
        }

        components.push(component);
    }

    stats.components = components.len();
    components
}

fn component_signed_volume(mesh: &Mesh, component: &[usize]) -> f64 {
    component
        .iter()
        .map(|&f| {
            let [a, b, c] = mesh.faces[f];
            let p0 = mesh.vertices[a as usize].position.coords;
            let p1 = mesh.vertices[b as usize].position.coords;
            let p2 = mesh.vertices[c as usize].position.coords;
            p0.dot(&p1.cross(&p2)) / 6.0
        })
        .sum()
}

/// Check that every edge shared by exactly two faces is traversed in
/// opposite directions by them.
pub fn has_consistent_winding(mesh: &Mesh) -> bool {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    adjacency.edge_faces().all(|((a, b), faces)| {
        if faces.len() != 2 {
            return true;
        }
        let d0 = edge_direction_in_face(&mesh.faces[faces[0]], a, b);
        let d1 = edge_direction_in_face(&mesh.faces[faces[1]], a, b);
        matches!((d0, d1), (Some(x), Some(y)) if x != y)
    })
}

/// Count faces touching an edge that is traversed the same way by both of
/// its faces.
pub fn count_inconsistent_edges(mesh: &Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    for ((a, b), faces) in adjacency.edge_faces() {
        if faces.len() == 2 {
            let d0 = edge_direction_in_face(&mesh.faces[faces[0]], a, b);
            let d1 = edge_direction_in_face(&mesh.faces[faces[1]], a, b);
            if d0 == d1 {
                seen.insert(normalize_edge(a, b));
            }
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
        mesh.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        mesh
    }

    #[test]
    fn test_already_consistent() {
        let mut mesh = tetrahedron();
        let stats = fix_winding_order(&mut mesh);
        assert_eq!(stats.faces_flipped, 0);
        assert_eq!(stats.components_inverted, 0);
        assert!(has_consistent_winding(&mesh));
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_fix_single_flipped_face() {
        let mut mesh = tetrahedron();
        mesh.faces[2].swap(1, 2);
        assert!(!has_consistent_winding(&mesh));

        fix_winding_order(&mut mesh);

        assert!(has_consistent_winding(&mesh));
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_inside_out_component_is_inverted() {
        let mut mesh = tetrahedron();
        mesh.flip_faces();
        assert!(mesh.signed_volume() < 0.0);

        let stats = fix_winding_order(&mut mesh);
        assert_eq!(stats.components_inverted, 1);
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_fix_disconnected_components() {
        let mut mesh = tetrahedron();
        let mut other = tetrahedron();
        other.translate(nalgebra::Vector3::new(10.0, 0.0, 0.0));
        other.flip_faces();
        other.faces[0].swap(1, 2);
        mesh.append(&other);

        let stats = fix_winding_order(&mut mesh);
        assert_eq!(stats.components, 2);
        assert!(has_consistent_winding(&mesh));
        approx::assert_relative_eq!(mesh.signed_volume(), 2.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inconsistent_edge_count() {
        let mut mesh = tetrahedron();
        mesh.faces[0].swap(1, 2);
        assert_eq!(count_inconsistent_edges(&mesh), 3);
    }
}
