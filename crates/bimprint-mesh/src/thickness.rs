//! Wall thickness estimation by inward ray casting.
//!
//! A bounding volume hierarchy over the faces accelerates the
//! Möller–Trumbore ray-triangle tests.

use std::fmt;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::{Mesh, Triangle};

/// Minimum wall thickness, tagged with how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ThicknessEstimate {
    /// Measured from ray hits against the opposite wall.
    Exact(f64),
    /// No ray hit anything; shortest edge length stands in.
    Approximate(f64),
}

impl ThicknessEstimate {
    pub fn value(&self) -> f64 {
        match *self {
            ThicknessEstimate::Exact(v) | ThicknessEstimate::Approximate(v) => v,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, ThicknessEstimate::Exact(_))
    }
}

impl fmt::Display for ThicknessEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThicknessEstimate::Exact(v) => write!(f, "{v:.3} mm"),
            ThicknessEstimate::Approximate(v) => write!(f, "~{v:.3} mm (approximate)"),
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &Triangle) -> Self {
        Self {
            min: tri.v0.inf(&tri.v1).inf(&tri.v2),
            max: tri.v0.sup(&tri.v1).sup(&tri.v2),
        }
    }

    fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn expand(&self, epsilon: f64) -> Self {
        let e = Vector3::repeat(epsilon);
        Self {
            min: self.min - e,
            max: self.max + e,
        }
    }

    /// Slab test. Returns the entry distance if the ray hits the box.
    fn ray_entry(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<f64> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for axis in 0..3 {
            let t1 = (self.min[axis] - origin[axis]) * dir_inv[axis];
            let t2 = (self.max[axis] - origin[axis]) * dir_inv[axis];
            // NaN from 0 * inf compares false and leaves the slab open.
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }
        (t_max >= t_min && t_max >= 0.0).then_some(t_min.max(0.0))
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        faces: Vec<usize>,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

const LEAF_SIZE: usize = 4;

impl BvhNode {
    fn build(triangles: &[Triangle], indices: &mut [usize], epsilon: f64) -> Option<Self> {
        let (&first, rest) = indices.split_first()?;
        let aabb = rest
            .iter()
            .fold(Aabb::from_triangle(&triangles[first]), |acc, &i| {
                acc.merge(&Aabb::from_triangle(&triangles[i]))
            })
            .expand(epsilon);

        if indices.len() <= LEAF_SIZE {
            return Some(BvhNode::Leaf {
                aabb,
                faces: indices.to_vec(),
            });
        }

        // Split at the median centroid along the longest axis.
        let extent = aabb.max - aabb.min;
        let axis = extent.imax();
        indices.sort_by(|&a, &b| {
            triangles[a].centroid()[axis]
                .partial_cmp(&triangles[b].centroid()[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = indices.len() / 2;
        let (l, r) = indices.split_at_mut(mid);

        match (
            BvhNode::build(triangles, l, epsilon),
            BvhNode::build(triangles, r, epsilon),
        ) {
            (Some(left), Some(right)) => Some(BvhNode::Internal {
                aabb,
                left: Box::new(left),
                right: Box::new(right),
            }),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Returns the distance along `direction` (unit length) if the ray hits.
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
) -> Option<f64> {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    // Parallel
    if a.abs() < 1e-14 * edge1.norm() * edge2.norm() {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    t.is_finite().then_some(t)
}

/// Closest-hit ray queries against a fixed mesh.
pub struct RayCaster {
    triangles: Vec<Triangle>,
    root: Option<BvhNode>,
}

impl RayCaster {
    /// Build the acceleration structure for `mesh`.
    pub fn new(mesh: &Mesh) -> Self {
        let triangles: Vec<Triangle> = mesh.triangles().collect();
        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let epsilon = mesh.max_extent().map_or(1e-9, |e| (e * 1e-9).max(1e-12));
        let root = BvhNode::build(&triangles, &mut indices, epsilon);
        Self { triangles, root }
    }

    /// Nearest hit with distance greater than `min_t`, as `(t, face)`.
    pub fn cast(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        min_t: f64,
    ) -> Option<(f64, usize)> {
        let root = self.root.as_ref()?;
        let dir_inv = direction.map(|d| 1.0 / d);
        let mut best: Option<(f64, usize)> = None;
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let limit = best.map_or(f64::INFINITY, |(t, _)| t);
            match node.aabb().ray_entry(origin, &dir_inv) {
                Some(t_near) if t_near <= limit => {}
                _ => continue,
            }

            match node {
                BvhNode::Leaf { faces, .. } => {
                    for &fi in faces {
                        if let Some(t) = ray_triangle_intersect(origin, direction, &self.triangles[fi])
                            && t > min_t
                            && best.is_none_or(|(bt, _)| t < bt)
                        {
                            best = Some((t, fi));
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        best
    }
}

/// Shortest distinct edge length of the mesh, or `None` without faces.
pub fn min_unique_edge_length(mesh: &Mesh) -> Option<f64> {
    crate::MeshAdjacency::build(&mesh.faces)
        .edges()
        .map(|(a, b)| (mesh.vertices[a as usize].position - mesh.vertices[b as usize].position).norm())
        .filter(|l| l.is_finite() && *l > 0.0)
        .min_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use approx::assert_relative_eq;

    fn slab(x: f64, y: f64, z: f64) -> Mesh {
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

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let down = Vector3::new(0.0, 0.0, -1.0);
        let t = ray_triangle_intersect(&Point3::new(0.2, 0.2, 3.0), &down, &tri).unwrap();
        assert_relative_eq!(t, 3.0);
        assert!(ray_triangle_intersect(&Point3::new(2.0, 2.0, 3.0), &down, &tri).is_none());
        let parallel = Vector3::new(1.0, 0.0, 0.0);
        assert!(ray_triangle_intersect(&Point3::new(0.2, 0.2, 0.0), &parallel, &tri).is_none());
    }

    #[test]
    fn test_cast_through_slab() {
        let mesh = slab(10.0, 10.0, 2.0);
        let caster = RayCaster::new(&mesh);
        let hit = caster.cast(
            &Point3::new(5.0, 5.0, 2.0 - 1e-6),
            &Vector3::new(0.0, 0.0, -1.0),
            1e-6,
        );
        let (t, _) = hit.unwrap();
        assert_relative_eq!(t, 2.0 - 1e-6, epsilon = 1e-9);
    }

    #[test]
    fn test_cast_ignores_hits_below_min_t() {
        let mesh = slab(10.0, 10.0, 2.0);
        let caster = RayCaster::new(&mesh);
        let hit = caster.cast(&Point3::new(5.0, 5.0, 2.0), &Vector3::new(0.0, 0.0, 1.0), 1e-6);
        assert!(hit.is_none());
    }

    #[test]
    fn test_min_unique_edge_length() {
        let mesh = slab(10.0, 4.0, 2.0);
        assert_relative_eq!(min_unique_edge_length(&mesh).unwrap(), 2.0);
        assert!(min_unique_edge_length(&Mesh::new()).is_none());
    }

    #[test]
    fn test_estimate_serializes_tagged() {
        let json = serde_json::to_string(&ThicknessEstimate::Exact(2.5)).unwrap();
        assert_eq!(json, r#"{"kind":"exact","value":2.5}"#);
        assert!(!ThicknessEstimate::Approximate(1.0).is_exact());
    }
}
