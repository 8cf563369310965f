//! Fitting a mesh into a printer build volume.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Mesh;
use crate::error::{MeshError, MeshResult};

/// Target build volume in millimeters.
///
/// Deserializes from either a single number (cube) or a three-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrinterVolume {
    /// Cube with the given edge length.
    Cube(f64),
    /// Per-axis limits [x, y, z].
    Box([f64; 3]),
}

impl PrinterVolume {
    /// Limits along x, y and z.
    pub fn limits(&self) -> [f64; 3] {
        match *self {
            PrinterVolume::Cube(size) => [size; 3],
            PrinterVolume::Box(limits) => limits,
        }
    }
}

impl From<f64> for PrinterVolume {
    fn from(size: f64) -> Self {
        PrinterVolume::Cube(size)
    }
}

impl From<[f64; 3]> for PrinterVolume {
    fn from(limits: [f64; 3]) -> Self {
        PrinterVolume::Box(limits)
    }
}

/// Center `mesh` on the origin and scale it uniformly to fit `target`.
///
/// The factor is `min(target[i] / extent[i])`, so the most constraining axis
/// decides. The centroid (vertex mean) is moved to the origin before scaling.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] for a mesh without faces.
/// - [`MeshError::DegenerateMesh`] when any extent is not finite and positive.
/// - [`MeshError::InvalidParameter`] when a target limit is not positive.
pub fn scale_for_printer(mesh: &Mesh, target: impl Into<PrinterVolume>) -> MeshResult<Mesh> {
    scale_for_printer_with_factor(mesh, target).map(|(scaled, _)| scaled)
}

/// Same as [`scale_for_printer`] but also returns the applied factor.
pub fn scale_for_printer_with_factor(
    mesh: &Mesh,
    target: impl Into<PrinterVolume>,
) -> MeshResult<(Mesh, f64)> {
    let target = target.into();
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot scale an empty mesh"));
    }

    let limits = target.limits();
    if let Some(bad) = limits.iter().find(|&&l| !(l.is_finite() && l > 0.0)) {
        return Err(MeshError::invalid_parameter(
            "target_size_mm",
            bad,
            "build volume limits must be positive",
        ));
    }

    let extents = mesh
        .extents()
        .ok_or_else(|| MeshError::empty_mesh("mesh has no vertices"))?;
    if extents.iter().any(|&e| !(e.is_finite() && e > 0.0)) {
        return Err(MeshError::degenerate_mesh(format!(
            "extents [{:.3}, {:.3}, {:.3}] are invalid for scaling",
            extents.x, extents.y, extents.z
        )));
    }

    let factor = (0..3)
        .map(|i| limits[i] / extents[i])
        .fold(f64::INFINITY, f64::min);

    info!(scale_factor = factor, "Scaling mesh to printer volume");

    let mut scaled = mesh.clone();
    if let Some(centroid) = scaled.centroid() {
        scaled.translate(-centroid.coords);
    }
    scaled.scale(factor);

    Ok((scaled, factor))
}
