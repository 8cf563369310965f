//! Volumetric reconstruction for building envelopes.
//!
//! Everything here goes through a dense [`VoxelGrid`]: the surface is
//! rasterized, the enclosed interior is flood filled from the outside,
//! optionally dilated, and the boundary is polygonized again with Surface
//! Nets. That makes the output closed even when the input is a soup of
//! overlapping, open building elements.
//!
//! # Envelope
//!
//! ```no_run
//! use bimprint_mesh::Mesh;
//! use bimprint_voxel::{EnvelopeParams, extract_envelope};
//!
//! let raw = Mesh::load("building.obj").unwrap();
//! let shell = extract_envelope(&raw, &EnvelopeParams::default()).unwrap();
//! ```
//!
//! # Wall thickening
//!
//! ```no_run
//! use bimprint_mesh::Mesh;
//! use bimprint_voxel::thicken_walls;
//!
//! let shell = Mesh::load("envelope.stl").unwrap();
//! let printable = thicken_walls(&shell, 2.0).unwrap();
//! ```
//!
//! # Grid budget
//!
//! Grids are capped at [`DEFAULT_MAX_VOXELS`] unless the caller passes a
//! different `max_voxels`. Automatic pitches are coarsened to fit; explicit
//! ones fail with [`VoxelError::GridTooLarge`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;

pub mod envelope;
pub mod grid;
pub mod polygonize;
pub mod thicken;

pub use envelope::{
    EnvelopeMethod, EnvelopeParams, default_envelope_pitch, extract_envelope,
    remove_internal_geometry,
};
pub use error::{VoxelError, VoxelErrorCode, VoxelRecoverySuggestion, VoxelResult};
pub use grid::{DEFAULT_MAX_VOXELS, VoxelGrid, resolve_pitch};
pub use polygonize::polygonize;
pub use thicken::{ThickenParams, ThickenResult, thicken_walls, thicken_walls_with_params};
