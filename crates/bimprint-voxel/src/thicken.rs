//! Volumetric wall thickening.
//!
//! The mesh is voxelized, its interior filled and the solid dilated until
//! every wall is at least the requested thickness, then polygonized again.
//! Thin features such as facade panels and roof sheets grow outward on both
//! sides; thick ones only get the dilation margin.

use serde::{Deserialize, Serialize};
use tracing::info;

use bimprint_mesh::tracing_ext::OperationTimer;
use bimprint_mesh::{Mesh, MeshError};

use crate::error::VoxelResult;
use crate::grid::{DEFAULT_MAX_VOXELS, VoxelGrid, resolve_pitch};
use crate::polygonize::polygonize;

/// Finest automatic thickening pitch in mesh units.
pub const MIN_THICKEN_PITCH: f64 = 0.5;

/// Parameters for [`thicken_walls_with_params`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThickenParams {
    /// Minimum wall thickness in millimeters.
    pub min_thickness_mm: f64,
    /// Explicit pitch. `None` uses `max(t / 2, 0.5)`, coarsened to the budget.
    #[serde(default)]
    pub voxel_pitch: Option<f64>,
    #[serde(default = "default_max_voxels")]
    pub max_voxels: usize,
}

fn default_max_voxels() -> usize {
    DEFAULT_MAX_VOXELS
}

impl ThickenParams {
    pub fn new(min_thickness_mm: f64) -> Self {
        Self {
            min_thickness_mm,
            voxel_pitch: None,
            max_voxels: DEFAULT_MAX_VOXELS,
        }
    }

    pub fn with_max_voxels(mut self, max_voxels: usize) -> Self {
        self.max_voxels = max_voxels;
        self
    }
}

/// Output of a thickening pass.
#[derive(Debug, Clone)]
pub struct ThickenResult {
    pub mesh: Mesh,
    /// Pitch actually used, after any coarsening.
    pub pitch: f64,
    /// Dilation layers applied.
    pub steps: usize,
}

/// Pitch before budget coarsening: `max(t / 2, 0.5)`.
pub fn default_thicken_pitch(min_thickness_mm: f64) -> f64 {
    (min_thickness_mm / 2.0).max(MIN_THICKEN_PITCH)
}

/// Dilation layers needed at `pitch`: `max(ceil(t / pitch), 1)`.
pub fn dilation_steps(min_thickness_mm: f64, pitch: f64) -> usize {
    ((min_thickness_mm / pitch).ceil() as usize).max(1)
}

/// Thicken every wall of `mesh` to at least `min_thickness_mm`.
pub fn thicken_walls(mesh: &Mesh, min_thickness_mm: f64) -> VoxelResult<Mesh> {
    thicken_walls_with_params(mesh, &ThickenParams::new(min_thickness_mm)).map(|r| r.mesh)
}

/// Thicken with explicit parameters.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] when the thickness is not positive.
/// - [`MeshError::EmptyMesh`] for a mesh without faces.
/// - [`VoxelError::GridTooLarge`](crate::VoxelError::GridTooLarge) when an
///   explicit pitch exceeds the budget.
pub fn thicken_walls_with_params(mesh: &Mesh, params: &ThickenParams) -> VoxelResult<ThickenResult> {
    let t = params.min_thickness_mm;
    if !(t.is_finite() && t > 0.0) {
        return Err(MeshError::invalid_parameter(
            "min_thickness_mm",
            t,
            "wall thickness must be a positive number of millimeters",
        )
        .into());
    }
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("cannot thicken an empty mesh").into());
    }

    let _timer = OperationTimer::with_mesh("thicken_walls", mesh);

    let default_pitch = default_thicken_pitch(t);
    // Steps never grow when the pitch is coarsened, so this padding is enough
    let max_padding = dilation_steps(t, params.voxel_pitch.unwrap_or(default_pitch)) + 1;
    let pitch = resolve_pitch(
        mesh,
        params.voxel_pitch,
        default_pitch,
        max_padding,
        params.max_voxels,
    )?;
    let steps = dilation_steps(t, pitch);

    let mut grid = VoxelGrid::voxelize(mesh, pitch, steps + 1, params.max_voxels)?;
    grid.fill();
    grid.dilate(steps);

    let thickened = polygonize(&grid)?;

    info!(
        min_thickness_mm = t,
        pitch,
        steps,
        faces_in = mesh.face_count(),
        faces_out = thickened.face_count(),
        "Walls thickened"
    );

    Ok(ThickenResult {
        mesh: thickened,
        pitch,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoxelError;
    use bimprint_mesh::{Vertex, validate_for_printing};

    fn create_box(x: f64, y: f64, z: f64) -> Mesh {
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
    fn test_pitch_and_steps() {
        assert_eq!(default_thicken_pitch(2.0), 1.0);
        assert_eq!(default_thicken_pitch(0.4), 0.5);
        assert_eq!(dilation_steps(2.0, 1.0), 2);
        assert_eq!(dilation_steps(2.0, 3.0), 1);
        assert_eq!(dilation_steps(0.4, 0.5), 1);
    }

    #[test]
    fn test_invalid_thickness() {
        let mesh = create_box(10.0, 10.0, 10.0);
        for t in [0.0, -1.0, f64::NAN] {
            let err = thicken_walls(&mesh, t).unwrap_err();
            assert!(matches!(
                err,
                VoxelError::Mesh(MeshError::InvalidParameter { name: "min_thickness_mm", .. })
            ));
        }
    }

    #[test]
    fn test_thin_plate_gets_thicker() {
        let plate = create_box(40.0, 40.0, 0.5);
        let before = validate_for_printing(&plate, 100).unwrap();

        let thick = thicken_walls(&plate, 2.0).unwrap();
        assert!(thick.is_watertight());

        let after = validate_for_printing(&thick, 100).unwrap();
        assert!(after.min_wall_thickness.value() >= before.min_wall_thickness.value());
        assert!(after.min_wall_thickness.value() >= 2.0);
        assert!(thick.extents().unwrap().z >= 2.0);
    }

    #[test]
    fn test_budget_coarsens_pitch() {
        let mesh = create_box(200.0, 200.0, 200.0);
        let result =
            thicken_walls_with_params(&mesh, &ThickenParams::new(2.0).with_max_voxels(100_000))
                .unwrap();
        assert!(result.pitch > 1.0);
        assert_eq!(result.steps, dilation_steps(2.0, result.pitch));
        assert!(result.mesh.is_watertight());
    }

    #[test]
    fn test_explicit_pitch_over_budget() {
        let mesh = create_box(200.0, 200.0, 200.0);
        let params = ThickenParams {
            voxel_pitch: Some(0.5),
            ..ThickenParams::new(2.0).with_max_voxels(100_000)
        };
        let err = thicken_walls_with_params(&mesh, &params).unwrap_err();
        assert!(matches!(err, VoxelError::GridTooLarge { .. }));
    }
}
