//! Dense occupancy grid: surface rasterization, exterior fill and dilation.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use bimprint_mesh::{Mesh, MeshError};

use crate::error::{VoxelError, VoxelResult};

/// Default upper bound on grid size (256³).
pub const DEFAULT_MAX_VOXELS: usize = 256 * 256 * 256;

/// Automatic pitch coarsening gives up after this many steps.
const MAX_COARSEN_STEPS: usize = 64;

/// Relative growth of the voxel box in the overlap test, so triangles lying
/// exactly on a voxel boundary mark both neighbours instead of neither.
const OVERLAP_SLACK: f64 = 1e-6;

/// 3D occupancy grid.
///
/// Sample `(x, y, z)` is the voxel centred at
/// `origin + (x + 0.5, y + 0.5, z + 0.5) * pitch`. The outermost `padding`
/// layers start empty so the exterior is connected.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// Grid dimensions [x, y, z].
    pub dims: [usize; 3],
    /// Min corner of voxel (0, 0, 0) in world coordinates.
    pub origin: Point3<f64>,
    /// Voxel edge length in mesh units.
    pub pitch: f64,
    /// Occupancy, x fastest.
    pub occupied: Vec<bool>,
}

impl VoxelGrid {
    /// Create an empty grid covering the mesh bounds plus `padding` voxels
    /// on every side.
    ///
    /// # Errors
    ///
    /// - [`MeshError::EmptyMesh`] when the mesh has no vertices.
    /// - [`MeshError::DegenerateMesh`] when the bounds are not finite.
    /// - [`MeshError::InvalidParameter`] for a non-positive pitch.
    /// - [`VoxelError::GridTooLarge`] when the grid exceeds `max_voxels`.
    pub fn from_mesh_bounds(
        mesh: &Mesh,
        pitch: f64,
        padding: usize,
        max_voxels: usize,
    ) -> VoxelResult<Self> {
        let (min, max) = mesh
            .bounds()
            .ok_or_else(|| MeshError::empty_mesh("cannot voxelize a mesh without vertices"))?;
        check_finite_extent(max - min)?;
        check_pitch(pitch)?;

        let dims = grid_dims(max - min, pitch, padding);
        let total = checked_total(dims);
        if total.is_none_or(|t| t > max_voxels) {
            return Err(VoxelError::grid_too_large(dims, max_voxels, pitch));
        }
        let total = total.unwrap_or_default();

        let pad = (padding as f64 + 0.5) * pitch;
        let origin = Point3::new(min.x - pad, min.y - pad, min.z - pad);

        debug!(
            dims = ?dims,
            total,
            pitch,
            padding,
            "Creating voxel grid"
        );

        Ok(Self {
            dims,
            origin,
            pitch,
            occupied: vec![false; total],
        })
    }

    /// Rasterize the surface of `mesh` into a new grid.
    pub fn voxelize(
        mesh: &Mesh,
        pitch: f64,
        padding: usize,
        max_voxels: usize,
    ) -> VoxelResult<Self> {
        let mut grid = Self::from_mesh_bounds(mesh, pitch, padding, max_voxels)?;
        grid.rasterize(mesh);
        Ok(grid)
    }

    /// Total number of voxels in the grid.
    #[inline]
    pub fn total_voxels(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Convert 3D grid coordinates to linear index.
    #[inline]
    pub fn linearize(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.dims[0] + z * self.dims[0] * self.dims[1]
    }

    /// Convert linear index to 3D grid coordinates.
    #[inline]
    pub fn delinearize(&self, idx: usize) -> [usize; 3] {
        let z = idx / (self.dims[0] * self.dims[1]);
        let rem = idx % (self.dims[0] * self.dims[1]);
        let y = rem / self.dims[0];
        let x = rem % self.dims[0];
        [x, y, z]
    }

    /// World position of a voxel center.
    #[inline]
    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Point3<f64> {
        Point3::new(
            self.origin.x + (x as f64 + 0.5) * self.pitch,
            self.origin.y + (y as f64 + 0.5) * self.pitch,
            self.origin.z + (z as f64 + 0.5) * self.pitch,
        )
    }

    #[inline]
    pub fn is_occupied(&self, x: usize, y: usize, z: usize) -> bool {
        self.occupied[self.linearize(x, y, z)]
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.par_iter().filter(|&&o| o).count()
    }

    /// Mark every voxel whose box touches a triangle of `mesh`.
    pub fn rasterize(&mut self, mesh: &Mesh) {
        let half = Vector3::repeat(self.pitch * 0.5 * (1.0 + OVERLAP_SLACK));
        let grid = &*self;

        let hits: Vec<usize> = mesh
            .triangles()
            .collect::<Vec<_>>()
            .par_iter()
            .flat_map_iter(|tri| {
                let verts = [tri.v0, tri.v1, tri.v2];
                let mut cells = Vec::new();
                if verts.iter().any(|v| !v.coords.iter().all(|c| c.is_finite())) {
                    return cells;
                }

                let mut lo = [0usize; 3];
                let mut hi = [0usize; 3];
                for axis in 0..3 {
                    let min = verts.iter().map(|v| v[axis]).fold(f64::INFINITY, f64::min);
                    let max = verts.iter().map(|v| v[axis]).fold(f64::NEG_INFINITY, f64::max);
                    lo[axis] = grid.cell_index(min, axis);
                    hi[axis] = grid.cell_index(max, axis);
                }

                for z in lo[2]..=hi[2] {
                    for y in lo[1]..=hi[1] {
                        for x in lo[0]..=hi[0] {
                            let c = grid.voxel_center(x, y, z);
                            if triangle_overlaps_box(
                                &half,
                                tri.v0 - c.coords,
                                tri.v1 - c.coords,
                                tri.v2 - c.coords,
                            ) {
                                cells.push(grid.linearize(x, y, z));
                            }
                        }
                    }
                }
                cells
            })
            .collect();

        for idx in hits {
            self.occupied[idx] = true;
        }

        debug!(
            faces = mesh.face_count(),
            occupied = self.occupied_count(),
            "Surface rasterized"
        );
    }

    /// Clamp a world coordinate to the index of the voxel containing it.
    fn cell_index(&self, value: f64, axis: usize) -> usize {
        let rel = ((value - self.origin[axis]) / self.pitch).floor();
        if rel <= 0.0 {
            0
        } else {
            (rel as usize).min(self.dims[axis] - 1)
        }
    }

    /// Flood the exterior from the grid border and mark everything it does
    /// not reach as solid.
    ///
    /// Returns the number of voxels that became solid.
    pub fn fill(&mut self) -> usize {
        let total = self.total_voxels();
        let mut exterior = vec![false; total];
        let mut stack = Vec::new();

        let [nx, ny, nz] = self.dims;
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let on_border =
                        x == 0 || y == 0 || z == 0 || x == nx - 1 || y == ny - 1 || z == nz - 1;
                    if !on_border {
                        continue;
                    }
                    let idx = self.linearize(x, y, z);
                    if !self.occupied[idx] && !exterior[idx] {
                        exterior[idx] = true;
                        stack.push(idx);
                    }
                }
            }
        }

        while let Some(idx) = stack.pop() {
            for n in self.neighbors(idx).into_iter().flatten() {
                if !self.occupied[n] && !exterior[n] {
                    exterior[n] = true;
                    stack.push(n);
                }
            }
        }

        let mut filled = 0;
        for (occ, ext) in self.occupied.iter_mut().zip(&exterior) {
            if !*occ && !*ext {
                *occ = true;
                filled += 1;
            }
        }

        debug!(filled, "Interior filled");
        filled
    }

    /// Grow the solid by `steps` layers of 6-connected neighbours.
    pub fn dilate(&mut self, steps: usize) {
        for step in 0..steps {
            let prev = self.occupied.clone();
            let grid = &*self;
            let next: Vec<bool> = (0..prev.len())
                .into_par_iter()
                .map(|idx| {
                    prev[idx]
                        || grid
                            .neighbors(idx)
                            .into_iter()
                            .flatten()
                            .any(|n| prev[n])
                })
                .collect();
            self.occupied = next;
            debug!(step = step + 1, steps, "Dilation step");
        }
    }

    /// Linear indices of the six face neighbours, `None` past the border.
    fn neighbors(&self, idx: usize) -> [Option<usize>; 6] {
        let [x, y, z] = self.delinearize(idx);
        let [nx, ny, nz] = self.dims;
        let sx = 1;
        let sy = nx;
        let sz = nx * ny;
        [
            (x > 0).then(|| idx - sx),
            (x + 1 < nx).then(|| idx + sx),
            (y > 0).then(|| idx - sy),
            (y + 1 < ny).then(|| idx + sy),
            (z > 0).then(|| idx - sz),
            (z + 1 < nz).then(|| idx + sz),
        ]
    }
}

/// Grid dimensions for an extent at `pitch` with `padding` empty layers.
pub fn grid_dims(extent: Vector3<f64>, pitch: f64, padding: usize) -> [usize; 3] {
    let axis = |e: f64| {
        let cells = (e.max(0.0) / pitch).ceil();
        let cells = if cells.is_finite() && cells < usize::MAX as f64 / 4.0 {
            cells as usize
        } else {
            usize::MAX / 4
        };
        cells.saturating_add(1).saturating_add(2 * padding)
    };
    [axis(extent.x), axis(extent.y), axis(extent.z)]
}

fn checked_total(dims: [usize; 3]) -> Option<usize> {
    dims[0].checked_mul(dims[1])?.checked_mul(dims[2])
}

/// Pick the pitch for a grid over `mesh`.
///
/// An explicit pitch must be positive and fit in `max_voxels`. Without one,
/// `default_pitch` is used and coarsened until the grid fits.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a non-positive explicit pitch.
/// - [`MeshError::DegenerateMesh`] when the mesh bounds are not finite.
/// - [`VoxelError::GridTooLarge`] when an explicit pitch, or the padding
///   alone, does not fit.
pub fn resolve_pitch(
    mesh: &Mesh,
    requested: Option<f64>,
    default_pitch: f64,
    padding: usize,
    max_voxels: usize,
) -> VoxelResult<f64> {
    let extent = mesh
        .extents()
        .ok_or_else(|| MeshError::empty_mesh("cannot voxelize a mesh without vertices"))?;
    check_finite_extent(extent)?;

    if let Some(pitch) = requested {
        check_pitch(pitch)?;
        let dims = grid_dims(extent, pitch, padding);
        if checked_total(dims).is_none_or(|t| t > max_voxels) {
            return Err(VoxelError::grid_too_large(dims, max_voxels, pitch));
        }
        return Ok(pitch);
    }

    check_pitch(default_pitch)?;
    let floor = checked_total(grid_dims(Vector3::zeros(), 1.0, padding));
    if floor.is_none_or(|t| t > max_voxels) {
        let dims = grid_dims(extent, default_pitch, padding);
        return Err(VoxelError::grid_too_large(dims, max_voxels, default_pitch));
    }

    let mut pitch = default_pitch;
    let mut steps = 0;
    loop {
        let dims = grid_dims(extent, pitch, padding);
        match checked_total(dims) {
            Some(total) if total <= max_voxels => break,
            _ if steps == MAX_COARSEN_STEPS || !pitch.is_finite() => {
                return Err(VoxelError::grid_too_large(dims, max_voxels, pitch));
            }
            _ => {
                let cells: f64 = dims.iter().map(|&d| d as f64).product();
                let ratio = cells / max_voxels as f64;
                pitch *= ratio.cbrt().max(1.01);
                steps += 1;
            }
        }
    }

    if pitch > default_pitch {
        warn!(
            requested = default_pitch,
            pitch,
            max_voxels,
            "Voxel pitch coarsened to fit the voxel budget"
        );
    } else {
        info!(pitch, "Voxel pitch");
    }
    Ok(pitch)
}

fn check_finite_extent(extent: Vector3<f64>) -> VoxelResult<()> {
    if extent.iter().all(|e| e.is_finite()) {
        return Ok(());
    }
    Err(MeshError::degenerate_mesh(format!(
        "mesh bounds are not finite: extents [{}, {}, {}]",
        extent.x, extent.y, extent.z
    ))
    .into())
}

fn check_pitch(pitch: f64) -> VoxelResult<()> {
    if pitch.is_finite() && pitch > 0.0 {
        return Ok(());
    }
    Err(MeshError::invalid_parameter(
        "voxel_pitch",
        pitch,
        "voxel pitch must be a positive number",
    )
    .into())
}

/// Separating-axis overlap test between a triangle and an origin-centred
/// axis-aligned box.
fn triangle_overlaps_box(
    half: &Vector3<f64>,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> bool {
    for axis in 0..3 {
        let min = v0[axis].min(v1[axis]).min(v2[axis]);
        let max = v0[axis].max(v1[axis]).max(v2[axis]);
        if max < -half[axis] || min > half[axis] {
            return false;
        }
    }

    let e0 = v1 - v0;
    let e1 = v2 - v1;
    let e2 = v0 - v2;

    if !overlaps_on_axis(&e0.cross(&e1), half, v0, v1, v2) {
        return false;
    }

    for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
        for edge in [e0, e1, e2] {
            let cross = axis.cross(&edge);
            if cross.norm_squared() > 1e-24 && !overlaps_on_axis(&cross, half, v0, v1, v2) {
                return false;
            }
        }
    }

    true
}

fn overlaps_on_axis(
    axis: &Vector3<f64>,
    half: &Vector3<f64>,
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
) -> bool {
    let p0 = axis.dot(&v0.coords);
    let p1 = axis.dot(&v1.coords);
    let p2 = axis.dot(&v2.coords);
    let radius = half.x * axis.x.abs() + half.y * axis.y.abs() + half.z * axis.z.abs();
    p0.min(p1).min(p2) <= radius && p0.max(p1).max(p2) >= -radius
}
