//! Triangle mesh operations for turning building models into printable solids.
//!
//! This crate holds the mesh half of the bimprint pipeline: unit handling,
//! repair, simplification, smoothing, printer fitting, print-readiness
//! validation and file I/O. Volumetric work (envelopes, wall thickening)
//! lives in `bimprint-voxel`.
//!
//! # Units and Scale
//!
//! Everything after [`normalize_to_millimeters`] works in **millimeters**.
//! Building models usually arrive in meters; [`detect_units`] guesses from the
//! bounding box.
//!
//! # Coordinate System
//!
//! Right-handed, Z up. Face winding is **counter-clockwise when viewed from
//! outside**, so normals point outward by the right-hand rule and a closed,
//! correctly oriented mesh has positive signed volume.
//!
//! # Quick Start
//!
//! ```no_run
//! use bimprint_mesh::{Mesh, SimplifyLevel, ensure_watertight, simplify};
//!
//! let mesh = Mesh::load("envelope.obj").unwrap();
//! let (mesh, _) = bimprint_mesh::normalize_to_millimeters(&mesh).unwrap();
//! let mesh = simplify(&mesh, SimplifyLevel::Medium).unwrap();
//! let mesh = ensure_watertight(&mesh).unwrap();
//!
//! let report = mesh.validate_for_printing().unwrap();
//! println!("{report}");
//! mesh.export("print.stl", bimprint_mesh::ExportFormat::Stl).unwrap();
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return [`MeshResult<T>`]. Every [`MeshError`] carries a
//! `MESH-XXXX` code and a [`RecoverySuggestion`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod types;

pub mod adjacency;
pub mod decimate;
pub mod holes;
pub mod io;
pub mod repair;
pub mod smooth;
pub mod thickness;
pub mod tracing_ext;
pub mod transform;
pub mod units;
pub mod validate;
pub mod winding;

pub use adjacency::MeshAdjacency;
pub use decimate::{DecimateResult, SimplifyLevel, decimate_to, simplify};
pub use error::{ErrorCode, MeshError, MeshResult, RecoverySuggestion};
pub use holes::{BoundaryLoop, detect_holes, fill_holes, fill_holes_with_max_edges};
pub use io::{ExportFormat, export_mesh, load_mesh, load_obj_objects};
pub use repair::{
    RepairStats, WatertightParams, compute_vertex_normals, ensure_watertight,
    ensure_watertight_with_params, remove_degenerate_faces, remove_duplicate_faces,
    remove_non_finite_vertices, remove_unreferenced_vertices,
};
pub use smooth::{smooth_surface, smooth_surface_with_strength};
pub use thickness::{RayCaster, ThicknessEstimate};
pub use tracing_ext::{OperationTimer, log_mesh_stats};
pub use transform::{PrinterVolume, scale_for_printer, scale_for_printer_with_factor};
pub use types::{Mesh, Triangle, Vertex};
pub use units::{MeshUnits, UnitOverride, detect_units, normalize_to_millimeters, scale_units};
pub use validate::{DEFAULT_SAMPLE_COUNT, ValidationReport, validate_for_printing};
pub use winding::{WindingStats, fix_winding_order, has_consistent_winding};

use std::path::Path;

impl Mesh {
    /// Load a mesh from an STL or OBJ file.
    pub fn load(path: impl AsRef<Path>) -> MeshResult<Self> {
        load_mesh(path.as_ref())
    }

    /// Write the mesh in `format`, returning the file size.
    pub fn export(&self, path: impl AsRef<Path>, format: ExportFormat) -> MeshResult<u64> {
        export_mesh(self, path.as_ref(), format)
    }

    /// Watertight, normals and thickness report with the default sample count.
    pub fn validate_for_printing(&self) -> MeshResult<ValidationReport> {
        validate_for_printing(self, DEFAULT_SAMPLE_COUNT)
    }

    /// Check that every edge is shared by exactly two faces.
    pub fn is_watertight(&self) -> bool {
        MeshAdjacency::build(&self.faces).is_watertight()
    }
}
