//! Unit detection and normalization to millimeters.
//!
//! Building models arrive either in meters or in millimeters and nothing in
//! a bare triangle mesh says which. The classification uses the largest
//! bounding box extent:
//!
//! | largest extent `E`   | detected unit |
//! |----------------------|---------------|
//! | `E >= 1000`          | millimeters   |
//! | `E <= 200`           | meters        |
//! | `200 < E < 1000`     | meters (ambiguous band) |
//!
//! The ambiguous band is a heuristic. A 500 m campus and a 500 mm detail
//! model look the same here; callers that know better override the unit
//! before normalization instead of asking this module to guess harder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Mesh;
use crate::error::{MeshError, MeshResult};

/// Extent at or above which a mesh is taken to be in millimeters.
pub const MILLIMETER_THRESHOLD: f64 = 1000.0;

/// Extent at or below which a mesh is taken to be in meters.
pub const METER_THRESHOLD: f64 = 200.0;

/// Physical unit of mesh coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshUnits {
    Meters,
    Millimeters,
}

impl MeshUnits {
    /// Factor that converts coordinates in this unit to millimeters.
    pub fn scale_to_millimeters(self) -> f64 {
        match self {
            MeshUnits::Meters => 1000.0,
            MeshUnits::Millimeters => 1.0,
        }
    }
}

impl fmt::Display for MeshUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshUnits::Meters => write!(f, "meters"),
            MeshUnits::Millimeters => write!(f, "millimeters"),
        }
    }
}

/// How the unit of an incoming mesh is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOverride {
    /// Classify from the bounding box.
    #[default]
    Auto,
    /// Treat coordinates as meters.
    Meters,
    /// Treat coordinates as millimeters.
    Millimeters,
}

impl UnitOverride {
    /// Resolve to a concrete unit, detecting from the mesh when `Auto`.
    pub fn resolve(self, mesh: &Mesh) -> MeshResult<MeshUnits> {
        match self {
            UnitOverride::Auto => detect_units(mesh),
            UnitOverride::Meters => Ok(MeshUnits::Meters),
            UnitOverride::Millimeters => Ok(MeshUnits::Millimeters),
        }
    }
}

impl FromStr for UnitOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(UnitOverride::Auto),
            "m" | "meter" | "meters" => Ok(UnitOverride::Meters),
            "mm" | "millimeter" | "millimeters" => Ok(UnitOverride::Millimeters),
            other => Err(format!("unknown unit {other:?}")),
        }
    }
}

/// Classify the unit of `mesh` from its largest bounding box extent.
///
/// # Errors
///
/// [`MeshError::EmptyMesh`] when the mesh has no faces.
pub fn detect_units(mesh: &Mesh) -> MeshResult<MeshUnits> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot detect units of an empty mesh"));
    }
    let max_extent = mesh
        .max_extent()
        .ok_or_else(|| MeshError::empty_mesh("mesh has no vertices"))?;

    let (units, reason) = if max_extent >= MILLIMETER_THRESHOLD {
        (MeshUnits::Millimeters, "max_extent >= 1000")
    } else if max_extent <= METER_THRESHOLD {
        (MeshUnits::Meters, "max_extent <= 200")
    } else {
        (MeshUnits::Meters, "ambiguous range, defaulting to meters")
    };

    info!(%units, max_extent, reason, "Detected mesh units");
    Ok(units)
}

/// Rescale `mesh` to millimeters about the origin.
///
/// Returns the scaled copy and the factor applied (1000.0 or 1.0).
pub fn normalize_to_millimeters(mesh: &Mesh) -> MeshResult<(Mesh, f64)> {
    let units = detect_units(mesh)?;
    Ok(scale_units(mesh, units))
}

/// Rescale `mesh` from a known unit to millimeters.
pub fn scale_units(mesh: &Mesh, units: MeshUnits) -> (Mesh, f64) {
    let factor = units.scale_to_millimeters();
    let mut normalized = mesh.clone();
    if factor != 1.0 {
        normalized.scale(factor);
    }
    info!(scale_factor = factor, "Normalized mesh to millimeters");
    (normalized, factor)
}
