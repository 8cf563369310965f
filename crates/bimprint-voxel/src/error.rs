// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler. This is a false positive in newer Rust versions.
#![allow(unused_assignments)]

//! Error types for volumetric operations.
//!
//! Codes follow the pattern `VOXEL-XXXX` where:
//! - 2xxx = Computation errors (grid budget, polygonization, hull)
//! - 3xxx = Errors from the underlying mesh operations

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for volumetric operations.
pub type VoxelResult<T> = Result<T, VoxelError>;

/// Machine-readable error codes for volumetric operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoxelErrorCode {
    /// VOXEL-2001: Voxel grid exceeds the budget
    GridTooLarge = 2001,
    /// VOXEL-2002: Polygonization produced nothing
    EmptyIsosurface = 2002,
    /// VOXEL-2003: Convex hull could not be built
    HullFailed = 2003,

    /// VOXEL-3001: Mesh operation failed
    MeshOperation = 3001,
}

impl VoxelErrorCode {
    /// Returns the error code as a string in the format `VOXEL-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoxelErrorCode::GridTooLarge => "VOXEL-2001",
            VoxelErrorCode::EmptyIsosurface => "VOXEL-2002",
            VoxelErrorCode::HullFailed => "VOXEL-2003",
            VoxelErrorCode::MeshOperation => "VOXEL-3001",
        }
    }
}

impl std::fmt::Display for VoxelErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for volumetric errors.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelRecoverySuggestion {
    /// Use a coarser pitch.
    IncreasePitch { current: f64, suggested: f64 },
    /// Raise the voxel budget.
    RaiseVoxelBudget { current: usize },
    /// Repair input mesh first.
    RepairInputMesh,
    /// Switch envelope method.
    UseVoxelMethod,
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for VoxelRecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoxelRecoverySuggestion::IncreasePitch { current, suggested } => {
                write!(
                    f,
                    "Increase the voxel pitch from {:.3}mm to at least {:.3}mm",
                    current, suggested
                )
            }
            VoxelRecoverySuggestion::RaiseVoxelBudget { current } => {
                write!(f, "Raise max_voxels above {}", current)
            }
            VoxelRecoverySuggestion::RepairInputMesh => {
                write!(f, "Repair the input mesh before volumetric processing")
            }
            VoxelRecoverySuggestion::UseVoxelMethod => {
                write!(f, "Use the voxel envelope method instead of the convex hull")
            }
            VoxelRecoverySuggestion::None => {
                write!(f, "No specific suggestion available")
            }
        }
    }
}

/// Errors that can occur during volumetric operations.
#[derive(Debug, Error, Diagnostic)]
pub enum VoxelError {
    /// The grid would exceed the voxel budget.
    #[error("voxel grid too large: {dims:?} = {total} voxels exceeds limit of {max} at pitch {pitch}")]
    #[diagnostic(
        code(voxel::grid::too_large),
        help("Use a coarser voxel pitch or leave the pitch unset so it is chosen automatically")
    )]
    GridTooLarge {
        dims: [usize; 3],
        total: usize,
        max: usize,
        pitch: f64,
    },

    /// Surface Nets found no surface in the grid.
    #[error("polygonization produced an empty mesh")]
    #[diagnostic(
        code(voxel::isosurface::empty),
        help(
            "The voxelized solid is empty. The input may be smaller than one voxel; try a finer pitch."
        )
    )]
    EmptyIsosurface,

    /// Convex hull construction failed.
    #[error("convex hull failed: {details}")]
    #[diagnostic(
        code(voxel::hull::failed),
        help("Coplanar or collinear input has no 3D hull. Try the voxel envelope method.")
    )]
    HullFailed { details: String },

    /// Underlying mesh error.
    #[error("mesh operation failed: {0}")]
    #[diagnostic(code(voxel::mesh::error))]
    Mesh(#[from] bimprint_mesh::MeshError),
}

impl VoxelError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> VoxelErrorCode {
        match self {
            VoxelError::GridTooLarge { .. } => VoxelErrorCode::GridTooLarge,
            VoxelError::EmptyIsosurface => VoxelErrorCode::EmptyIsosurface,
            VoxelError::HullFailed { .. } => VoxelErrorCode::HullFailed,
            VoxelError::Mesh(_) => VoxelErrorCode::MeshOperation,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> VoxelRecoverySuggestion {
        match self {
            VoxelError::GridTooLarge {
                total, max, pitch, ..
            } => {
                let scale = (*total as f64 / *max as f64).cbrt();
                VoxelRecoverySuggestion::IncreasePitch {
                    current: *pitch,
                    suggested: pitch * scale,
                }
            }
            VoxelError::EmptyIsosurface => VoxelRecoverySuggestion::RepairInputMesh,
            VoxelError::HullFailed { .. } => VoxelRecoverySuggestion::UseVoxelMethod,
            VoxelError::Mesh(_) => VoxelRecoverySuggestion::RepairInputMesh,
        }
    }

    // Constructor helpers

    /// Create a grid too large error.
    pub fn grid_too_large(dims: [usize; 3], max: usize, pitch: f64) -> Self {
        VoxelError::GridTooLarge {
            dims,
            total: dims[0].saturating_mul(dims[1]).saturating_mul(dims[2]),
            max,
            pitch,
        }
    }

    /// Create a hull failed error.
    pub fn hull_failed(details: impl Into<String>) -> Self {
        VoxelError::HullFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = VoxelError::EmptyIsosurface;
        assert_eq!(err.code(), VoxelErrorCode::EmptyIsosurface);
        assert_eq!(err.code().as_str(), "VOXEL-2002");
    }

    #[test]
    fn test_grid_too_large_suggestion() {
        let err = VoxelError::grid_too_large([200, 200, 200], 1_000_000, 1.0);
        match err.recovery_suggestion() {
            VoxelRecoverySuggestion::IncreasePitch { current, suggested } => {
                assert_eq!(current, 1.0);
                assert!(suggested > 1.9 && suggested < 2.1);
            }
            other => panic!("Expected IncreasePitch suggestion, got {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = VoxelError::grid_too_large([100, 100, 100], 500_000, 0.5);
        let display = format!("{}", err);
        assert!(display.contains("1000000 voxels"));
        assert!(display.contains("500000"));
    }

    #[test]
    fn test_from_mesh_error() {
        let mesh_err = bimprint_mesh::MeshError::empty_mesh("test");
        let err: VoxelError = mesh_err.into();
        assert!(matches!(err, VoxelError::Mesh(_)));
        assert_eq!(err.code().as_str(), "VOXEL-3001");
    }
}
