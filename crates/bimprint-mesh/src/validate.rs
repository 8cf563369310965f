//! Print-readiness validation.

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Mesh;
use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::thickness::{RayCaster, ThicknessEstimate, min_unique_edge_length};
use crate::winding::has_consistent_winding;

/// Default number of surface samples for thickness estimation.
pub const DEFAULT_SAMPLE_COUNT: usize = 250;

const SAMPLE_SEED: u64 = 0x5eed_b1b0;

/// Print-readiness summary of a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every edge is shared by exactly two faces.
    pub is_watertight: bool,
    /// Every two-face edge is traversed in opposite directions.
    pub has_correct_normals: bool,
    pub min_wall_thickness: ThicknessEstimate,
    /// `[min_x, min_y, min_z, max_x, max_y, max_z]`.
    pub bounding_box: [f64; 6],
    /// Enclosed volume, zero unless watertight.
    pub volume: f64,
}

impl ValidationReport {
    /// Watertight with consistent normals and walls at least `min_thickness`.
    pub fn is_printable(&self, min_thickness: f64) -> bool {
        self.is_watertight
            && self.has_correct_normals
            && self.min_wall_thickness.value() >= min_thickness
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.bounding_box;
        writeln!(f, "Validation Report:")?;
        writeln!(f, "  Watertight: {}", self.is_watertight)?;
        writeln!(f, "  Consistent normals: {}", self.has_correct_normals)?;
        writeln!(f, "  Min wall thickness: {}", self.min_wall_thickness)?;
        writeln!(
            f,
            "  Bounds: [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )?;
        write!(f, "  Volume: {:.3}", self.volume)
    }
}

/// Validate `mesh` for printing using `sample_count` thickness rays.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] for a mesh without faces.
/// - [`MeshError::InvalidParameter`] when `sample_count` is zero.
pub fn validate_for_printing(mesh: &Mesh, sample_count: usize) -> MeshResult<ValidationReport> {
    if sample_count == 0 {
        return Err(MeshError::invalid_parameter(
            "sample_count",
            sample_count,
            "at least one surface sample is required",
        ));
    }
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot validate an empty mesh"));
    }

    let (min, max) = mesh
        .bounds()
        .ok_or_else(|| MeshError::empty_mesh("mesh has no vertices"))?;

    let is_watertight = MeshAdjacency::build(&mesh.faces).is_watertight();
    let has_correct_normals = has_consistent_winding(mesh);
    let min_wall_thickness = estimate_min_wall_thickness(mesh, sample_count);
    let volume = if is_watertight { mesh.volume() } else { 0.0 };

    let report = ValidationReport {
        is_watertight,
        has_correct_normals,
        min_wall_thickness,
        bounding_box: [min.x, min.y, min.z, max.x, max.y, max.z],
        volume,
    };

    info!(
        is_watertight,
        has_correct_normals,
        min_wall_thickness = min_wall_thickness.value(),
        exact = min_wall_thickness.is_exact(),
        volume,
        "Validation report"
    );
    Ok(report)
}

/// Smallest inward ray distance over area-weighted surface samples.
///
/// Falls back to the shortest edge when no ray hits the opposite wall.
pub fn estimate_min_wall_thickness(mesh: &Mesh, sample_count: usize) -> ThicknessEstimate {
    let eps = (mesh.max_extent().unwrap_or(0.0) * 1e-6).max(1e-6);
    let samples = sample_surface(mesh, sample_count, SAMPLE_SEED);
    let caster = RayCaster::new(mesh);

    let hits: Vec<f64> = samples
        .par_iter()
        .filter_map(|(p, n)| {
            let origin = *p - *n * eps;
            let inward = -*n;
            caster.cast(&origin, &inward, eps).map(|(t, _)| t)
        })
        .filter(|&t| t > eps)
        .collect();

    debug!(samples = samples.len(), hits = hits.len(), eps, "Thickness rays cast");

    match hits.into_iter().min_by(f64::total_cmp) {
        Some(t) => ThicknessEstimate::Exact(t),
        None => {
            let fallback = min_unique_edge_length(mesh).unwrap_or(0.0);
            warn!(
                fallback,
                "No thickness ray hit the opposite wall, using shortest edge"
            );
            ThicknessEstimate::Approximate(fallback)
        }
    }
}

/// Area-weighted random points with their face normals.
fn sample_surface(mesh: &Mesh, count: usize, seed: u64) -> Vec<(Point3<f64>, Vector3<f64>)> {
    let faces: Vec<_> = mesh
        .triangles()
        .filter_map(|tri| {
            let area = tri.area();
            let normal = tri.normal()?;
            (area.is_finite() && area > 0.0).then_some((tri, normal, area))
        })
        .collect();
    if faces.is_empty() {
        return Vec::new();
    }

    let mut cumulative = Vec::with_capacity(faces.len());
    let mut total = 0.0;
    for (_, _, area) in &faces {
        total += area;
        cumulative.push(total);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let pick = rng.gen_range(0.0..total);
            let idx = cumulative
                .partition_point(|&c| c <= pick)
                .min(faces.len() - 1);
            let (tri, normal, _) = &faces[idx];

            let (mut u, mut v): (f64, f64) = (rng.r#gen(), rng.r#gen());
            if u + v > 1.0 {
                u = 1.0 - u;
                v = 1.0 - v;
            }
            (tri.point_at(u, v), *normal)
        })
        .collect()
}
