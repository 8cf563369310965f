//! Mesh simplification by edge collapse with quadric error metrics.
//!
//! Each vertex accumulates the planes of its incident faces as a symmetric
//! 4x4 quadric. Edges are collapsed cheapest first from a binary heap; stale
//! heap entries are recognised by a per-vertex generation counter.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::adjacency::normalize_edge;
use crate::error::{MeshError, MeshResult};
use crate::repair::remove_unreferenced_vertices;
use crate::{Mesh, MeshAdjacency};

/// Simplification never reduces a mesh below this many faces.
pub const MIN_TARGET_FACES: usize = 100;

/// Smallest accepted keep ratio.
pub const MIN_RATIO: f64 = 0.05;

/// How aggressively to simplify.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimplifyLevel {
    /// Keep a quarter of the faces.
    Low,
    /// Keep half of the faces.
    Medium,
    /// Keep three quarters of the faces.
    High,
    /// Keep this fraction of the faces, clamped to `[0.05, 1.0]`.
    Ratio(f64),
}

impl SimplifyLevel {
    /// Fraction of faces to keep.
    pub fn ratio(self) -> f64 {
        match self {
            SimplifyLevel::Low => 0.25,
            SimplifyLevel::Medium => 0.5,
            SimplifyLevel::High => 0.75,
            SimplifyLevel::Ratio(r) if r.is_nan() => 1.0,
            SimplifyLevel::Ratio(r) => r.clamp(MIN_RATIO, 1.0),
        }
    }

    /// Target face count for a mesh with `faces` faces.
    pub fn target_faces(self, faces: usize) -> usize {
        ((faces as f64 * self.ratio()).floor() as usize).max(MIN_TARGET_FACES)
    }
}

impl fmt::Display for SimplifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimplifyLevel::Low => write!(f, "low"),
            SimplifyLevel::Medium => write!(f, "medium"),
            SimplifyLevel::High => write!(f, "high"),
            SimplifyLevel::Ratio(r) => write!(f, "{r}"),
        }
    }
}

impl FromStr for SimplifyLevel {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SimplifyLevel::Low),
            "medium" => Ok(SimplifyLevel::Medium),
            "high" => Ok(SimplifyLevel::High),
            other => match other.parse::<f64>() {
                Ok(r) if r.is_finite() && r > 0.0 => Ok(SimplifyLevel::Ratio(r)),
                _ => Err(MeshError::unsupported_level(s)),
            },
        }
    }
}

impl Serialize for SimplifyLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SimplifyLevel::Ratio(r) => serializer.serialize_f64(*r),
            named => serializer.serialize_str(&named.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for SimplifyLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Ratio(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Raw::Ratio(r) if r.is_finite() && r > 0.0 => Ok(SimplifyLevel::Ratio(r)),
            Raw::Ratio(r) => Err(serde::de::Error::custom(format!(
                "simplification ratio must be positive, got {r}"
            ))),
        }
    }
}

/// Result of a decimation run.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    pub mesh: Mesh,
    pub original_faces: usize,
    pub final_faces: usize,
    pub collapses_performed: usize,
    pub collapses_rejected: usize,
}

/// Simplify `mesh` to the level's target face count.
///
/// The result always has between `min(100, faces)` and `faces` faces.
///
/// # Errors
///
/// [`MeshError::EmptyMesh`] for a mesh without faces.
pub fn simplify(mesh: &Mesh, level: SimplifyLevel) -> MeshResult<Mesh> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot simplify an empty mesh"));
    }

    let target = level.target_faces(mesh.face_count());
    info!(
        %level,
        ratio = level.ratio(),
        faces = mesh.face_count(),
        target,
        "Simplifying mesh"
    );

    let result = decimate_to(mesh, target);
    info!(
        before = result.original_faces,
        after = result.final_faces,
        collapses = result.collapses_performed,
        rejected = result.collapses_rejected,
        "Simplification complete"
    );
    Ok(result.mesh)
}

/// Symmetric 4x4 plane quadric, upper triangle row-major.
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(n: Vector3<f64>, d: f64) -> Self {
        let (a, b, c) = (n.x, n.y, n.z);
        Quadric([
            a * a,
            a * b,
            a * c,
            a * d,
            b * b,
            b * c,
            b * d,
            c * c,
            c * d,
            d * d,
        ])
    }

    fn add(&mut self, other: &Quadric) {
        for (x, y) in self.0.iter_mut().zip(other.0) {
            *x += y;
        }
    }

    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let [a, b, c, d, e, f, g, h, i, j] = self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        a * x * x
            + 2.0 * b * x * y
            + 2.0 * c * x * z
            + 2.0 * d * x
            + e * y * y
            + 2.0 * f * y * z
            + 2.0 * g * y
            + h * z * z
            + 2.0 * i * z
            + j
    }

    /// Point minimising the error, or `None` when the system is singular.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let [a, b, c, d, e, f, g, h, i, _] = self.0;
        let m = nalgebra::Matrix3::new(a, b, c, b, e, f, c, f, h);
        if m.determinant().abs() < 1e-10 {
            return None;
        }
        let inv = m.try_inverse()?;
        let p = inv * Vector3::new(-d, -g, -i);
        p.iter().all(|v| v.is_finite()).then(|| Point3::from(p))
    }
}

#[derive(Debug, Clone)]
struct Collapse {
    v1: u32,
    v2: u32,
    cost: f64,
    target: Point3<f64>,
    generation: (u32, u32),
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

struct Decimator {
    positions: Vec<Point3<f64>>,
    alive: Vec<bool>,
    generation: Vec<u32>,
    quadrics: Vec<Quadric>,
    faces: Vec<Option<[u32; 3]>>,
    vertex_faces: Vec<Vec<usize>>,
    boundary_vertices: HashSet<u32>,
    active_faces: usize,
}

impl Decimator {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.vertices.len();
        let mut quadrics = vec![Quadric::default(); n];
        let mut vertex_faces = vec![Vec::new(); n];

        for (fi, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v as usize].push(fi);
            }
            let Some(tri) = mesh.triangle(fi) else {
                continue;
            };
            let Some(normal) = tri.normal() else {
                continue;
            };
            let q = Quadric::from_plane(normal, -normal.dot(&tri.v0.coords));
            for &v in face {
                quadrics[v as usize].add(&q);
            }
        }

        let adjacency = MeshAdjacency::build(&mesh.faces);
        let boundary_vertices = adjacency
            .boundary_edges()
            .flat_map(|(a, b)| [a, b])
            .collect();

        Self {
            positions: mesh.vertices.iter().map(|v| v.position).collect(),
            alive: vec![true; n],
            generation: vec![0; n],
            quadrics,
            faces: mesh.faces.iter().copied().map(Some).collect(),
            vertex_faces,
            boundary_vertices,
            active_faces: mesh.faces.len(),
        }
    }

    fn candidate(&self, v1: u32, v2: u32) -> Option<Collapse> {
        // Open borders stay put.
        if self.boundary_vertices.contains(&v1) || self.boundary_vertices.contains(&v2) {
            return None;
        }
        let mut q = self.quadrics[v1 as usize];
        q.add(&self.quadrics[v2 as usize]);

        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let target = q.optimal_point().unwrap_or_else(|| nalgebra::center(&p1, &p2));

        Some(Collapse {
            v1,
            v2,
            cost: q.evaluate(&target),
            target,
            generation: (self.generation[v1 as usize], self.generation[v2 as usize]),
        })
    }

    fn is_stale(&self, c: &Collapse) -> bool {
        !self.alive[c.v1 as usize]
            || !self.alive[c.v2 as usize]
            || self.generation[c.v1 as usize] != c.generation.0
            || self.generation[c.v2 as usize] != c.generation.1
    }

    fn live_faces(&self, v: u32) -> impl Iterator<Item = (usize, [u32; 3])> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .filter_map(|&fi| self.faces[fi].map(|f| (fi, f)))
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.live_faces(v)
            .flat_map(|(_, f)| f)
            .filter(|&u| u != v)
            .collect()
    }

    /// Number of faces that would vanish, or `None` if the collapse is invalid.
    fn check(&self, c: &Collapse) -> Option<usize> {
        let shared: Vec<usize> = self
            .live_faces(c.v1)
            .filter(|(_, f)| f.contains(&c.v2))
            .map(|(fi, _)| fi)
            .collect();
        if shared.is_empty() {
            return None;
        }

        // Link condition
        let n1 = self.neighbors(c.v1);
        let n2 = self.neighbors(c.v2);
        if n1.intersection(&n2).count() > 2 {
            return None;
        }

        // Reject collapses that would fold a surviving face over.
        for v in [c.v1, c.v2] {
            for (fi, face) in self.live_faces(v) {
                if shared.contains(&fi) {
                    continue;
                }
                let before = self.face_normal(&face, None);
                let after = self.face_normal(&face, Some((v, c.target)));
                match (before, after) {
                    (Some(b), Some(a)) if b.dot(&a) > 0.2 => {}
                    _ => return None,
                }
            }
        }

        Some(shared.len())
    }

    fn face_normal(&self, face: &[u32; 3], moved: Option<(u32, Point3<f64>)>) -> Option<Vector3<f64>> {
        let p = |v: u32| match moved {
            Some((m, pos)) if m == v => pos,
            _ => self.positions[v as usize],
        };
        let (a, b, c) = (p(face[0]), p(face[1]), p(face[2]));
        (b - a).cross(&(c - a)).try_normalize(1e-300)
    }

    /// Merge `c.v2` into `c.v1`.
    fn apply(&mut self, c: &Collapse) {
        let (keep, gone) = (c.v1, c.v2);
        self.positions[keep as usize] = c.target;
        let q = self.quadrics[gone as usize];
        self.quadrics[keep as usize].add(&q);
        self.alive[gone as usize] = false;
        self.generation[keep as usize] += 1;

        let moved = std::mem::take(&mut self.vertex_faces[gone as usize]);
        for fi in moved {
            let Some(face) = self.faces[fi].as_mut() else {
                continue;
            };
            for idx in face.iter_mut() {
                if *idx == gone {
                    *idx = keep;
                }
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                self.faces[fi] = None;
                self.active_faces -= 1;
            } else {
                self.vertex_faces[keep as usize].push(fi);
            }
        }
        let faces = &self.faces;
        self.vertex_faces[keep as usize].retain(|&fi| faces[fi].is_some());
        self.vertex_faces[keep as usize].dedup();
    }
}

/// Collapse edges until the mesh has at most `target` faces or no valid
/// collapse remains. Never goes below `target`.
pub fn decimate_to(mesh: &Mesh, target: usize) -> DecimateResult {
    let original_faces = mesh.face_count();
    if original_faces <= target {
        let mut out = mesh.clone();
        remove_unreferenced_vertices(&mut out);
        return DecimateResult {
            mesh: out,
            original_faces,
            final_faces: original_faces,
            collapses_performed: 0,
            collapses_rejected: 0,
        };
    }

    let mut state = Decimator::new(mesh);
    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let (a, b) = (face[i], face[(i + 1) % 3]);
            if seen.insert(normalize_edge(a, b))
                && let Some(c) = state.candidate(a, b)
            {
                heap.push(c);
            }
        }
    }

    let mut performed = 0;
    let mut rejected = 0;

    while state.active_faces > target {
        let Some(c) = heap.pop() else {
            break;
        };
        if state.is_stale(&c) {
            continue;
        }
        let Some(removed) = state.check(&c) else {
            rejected += 1;
            continue;
        };
        if state.active_faces - removed < target {
            rejected += 1;
            continue;
        }

        state.apply(&c);
        performed += 1;

        let keep = c.v1;
        for n in state.neighbors(keep) {
            if let Some(next) = state.candidate(keep, n) {
                heap.push(next);
            }
        }
    }

    debug!(performed, rejected, faces = state.active_faces, "Decimation finished");

    let mut out = Mesh::with_capacity(mesh.vertex_count(), state.active_faces);
    out.vertices = mesh
        .vertices
        .iter()
        .zip(&state.positions)
        .map(|(v, p)| {
            let mut v = v.clone();
            v.position = *p;
            v.normal = None;
            v
        })
        .collect();
    out.faces = state.faces.iter().flatten().copied().collect();
    remove_unreferenced_vertices(&mut out);

    DecimateResult {
        final_faces: out.face_count(),
        mesh: out,
        original_faces,
        collapses_performed: performed,
        collapses_rejected: rejected,
    }
}
