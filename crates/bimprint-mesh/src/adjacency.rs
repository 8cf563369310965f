//! Mesh adjacency data structures.
//!
//! Provides edge-to-face lookups used by repair, hole filling and validation.

use hashbrown::HashMap;

/// Adjacency information for a mesh.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// Maps edge (v0, v1) to list of face indices. v0 < v1.
    edge_to_faces: HashMap<(u32, u32), Vec<usize>>,
}

impl MeshAdjacency {
    /// Build adjacency information from a list of faces.
    ///
    /// ```
    /// use bimprint_mesh::MeshAdjacency;
    ///
    /// let faces = vec![[0, 1, 2], [1, 3, 2]];
    /// let adj = MeshAdjacency::build(&faces);
    ///
    /// assert_eq!(adj.boundary_edge_count(), 4);
    /// ```
    #[must_use]
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<usize>> =
            HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let edge = normalize_edge(face[i], face[(i + 1) % 3]);
                edge_to_faces.entry(edge).or_default().push(face_idx);
            }
        }

        Self { edge_to_faces }
    }

    /// Get faces adjacent to an edge, or `None` if the edge is absent.
    #[must_use]
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[usize]> {
        self.edge_to_faces
            .get(&normalize_edge(v0, v1))
            .map(Vec::as_slice)
    }

    /// Iterate over all boundary edges (edges with exactly one adjacent face).
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Count the number of boundary edges.
    #[must_use]
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() == 1)
            .count()
    }

    /// Count edges shared by more than two faces.
    #[must_use]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|faces| faces.len() > 2)
            .count()
    }

    /// Check if the mesh is manifold (all edges have at most 2 adjacent faces).
    #[must_use]
    pub fn is_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() <= 2)
    }

    /// Check if every edge is shared by exactly two faces.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        !self.edge_to_faces.is_empty() && self.edge_to_faces.values().all(|faces| faces.len() == 2)
    }

    /// Get the total number of unique edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }

    /// Iterate over unique edges.
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces.keys().copied()
    }

    /// Iterate over edges together with their adjacent faces.
    pub fn edge_faces(&self) -> impl Iterator<Item = ((u32, u32), &[usize])> + '_ {
        self.edge_to_faces
            .iter()
            .map(|(&edge, faces)| (edge, faces.as_slice()))
    }
}

/// Normalize edge direction so v0 < v1.
#[inline]
pub(crate) fn normalize_edge(v0: u32, v1: u32) -> (u32, u32) {
    if v0 < v1 { (v0, v1) } else { (v1, v0) }
}

/// Check if edge (a, b) appears in face in the same direction (a -> b).
/// Returns Some(true) if same direction, Some(false) if opposite, None if absent.
pub(crate) fn edge_direction_in_face(face: &[u32; 3], a: u32, b: u32) -> Option<bool> {
    for i in 0..3 {
        let v0 = face[i];
        let v1 = face[(i + 1) % 3];

        if v0 == a && v1 == b {
            return Some(true);
        }
        if v0 == b && v1 == a {
            return Some(false);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<[u32; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]]
    }

    #[test]
    fn faces_for_edge() {
        let faces = vec![[0, 1, 2], [1, 3, 2]];
        let adj = MeshAdjacency::build(&faces);

        assert_eq!(adj.faces_for_edge(2, 1).map(<[usize]>::len), Some(2));
        assert_eq!(adj.faces_for_edge(0, 1).map(<[usize]>::len), Some(1));
        assert!(adj.faces_for_edge(0, 3).is_none());
    }

    #[test]
    fn closed_tetrahedron_is_watertight() {
        let adj = MeshAdjacency::build(&tetrahedron());
        assert_eq!(adj.edge_count(), 6);
        assert!(adj.is_watertight());
        assert!(adj.is_manifold());
    }

    #[test]
    fn non_manifold_edge_is_not_watertight() {
        let mut faces = tetrahedron();
        faces.push([0, 1, 4]);
        let adj = MeshAdjacency::build(&faces);
        assert_eq!(adj.non_manifold_edge_count(), 1);
        assert!(!adj.is_watertight());
        assert!(!adj.is_manifold());
    }

    #[test]
    fn empty_is_not_watertight() {
        assert!(!MeshAdjacency::build(&[]).is_watertight());
    }

    #[test]
    fn edge_direction() {
        let face = [0, 1, 2];
        assert_eq!(edge_direction_in_face(&face, 0, 1), Some(true));
        assert_eq!(edge_direction_in_face(&face, 1, 0), Some(false));
        assert_eq!(edge_direction_in_face(&face, 0, 5), None);
    }
}
