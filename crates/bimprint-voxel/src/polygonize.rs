//! Surface extraction from an occupancy grid using Surface Nets.

use tracing::{debug, info};

use bimprint_mesh::{Mesh, Vertex, remove_unreferenced_vertices};

use crate::error::{VoxelError, VoxelResult};
use crate::grid::VoxelGrid;

const SOLID: f32 = -1.0;
const EMPTY: f32 = 1.0;

/// Polygonize the boundary of the solid voxels.
///
/// Solid samples map to -1 and empty ones to +1, so the surface sits half
/// way between a solid voxel centre and its empty neighbour. Voxels that
/// touch only along an edge or at a corner are bridged first, so the result
/// is a closed 2-manifold. It is oriented outward and carries no orphaned
/// vertices.
pub fn polygonize(grid: &VoxelGrid) -> VoxelResult<Mesh> {
    use fast_surface_nets::{SurfaceNetsBuffer, ndshape::RuntimeShape, surface_nets};

    info!(dims = ?grid.dims, pitch = grid.pitch, "Polygonizing voxel grid");

    // Pad by one empty layer on each side
    let padded_dims = [grid.dims[0] + 2, grid.dims[1] + 2, grid.dims[2] + 2];
    let padded_size = padded_dims[0] * padded_dims[1] * padded_dims[2];
    let mut solid = vec![false; padded_size];

    for z in 0..grid.dims[2] {
        for y in 0..grid.dims[1] {
            for x in 0..grid.dims[0] {
                let dst =
                    (x + 1) + (y + 1) * padded_dims[0] + (z + 1) * padded_dims[0] * padded_dims[1];
                solid[dst] = grid.is_occupied(x, y, z);
            }
        }
    }

    let bridged = close_diagonal_contacts(&mut solid, padded_dims);
    if bridged > 0 {
        debug!(bridged, "Bridged voxels touching only at edges or corners");
    }

    let samples: Vec<f32> = solid
        .iter()
        .map(|&s| if s { SOLID } else { EMPTY })
        .collect();

    let shape = RuntimeShape::<u32, 3>::new([
        padded_dims[0] as u32,
        padded_dims[1] as u32,
        padded_dims[2] as u32,
    ]);

    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(
        &samples,
        &shape,
        [0, 0, 0],
        [
            padded_dims[0] as u32 - 1,
            padded_dims[1] as u32 - 1,
            padded_dims[2] as u32 - 1,
        ],
        &mut buffer,
    );

    if buffer.positions.is_empty() || buffer.indices.is_empty() {
        return Err(VoxelError::EmptyIsosurface);
    }

    debug!(
        positions = buffer.positions.len(),
        indices = buffer.indices.len(),
        "Surface nets complete"
    );

    let mut mesh = Mesh::with_capacity(buffer.positions.len(), buffer.indices.len() / 3);

    // Padded sample k is grid voxel k - 1, centred at origin + (k - 0.5) * pitch
    for pos in &buffer.positions {
        mesh.vertices.push(Vertex::from_coords(
            grid.origin.x + (pos[0] as f64 - 0.5) * grid.pitch,
            grid.origin.y + (pos[1] as f64 - 0.5) * grid.pitch,
            grid.origin.z + (pos[2] as f64 - 0.5) * grid.pitch,
        ));
    }

    for chunk in buffer.indices.chunks_exact(3) {
        mesh.faces.push([chunk[0], chunk[1], chunk[2]]);
    }

    remove_unreferenced_vertices(&mut mesh);
    if mesh.signed_volume() < 0.0 {
        mesh.flip_faces();
    }

    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Polygonized mesh created"
    );

    Ok(mesh)
}

/// Fill voxels until every 2x2x2 block has face-connected solid corners and
/// face-connected empty corners.
///
/// Surface Nets places one vertex per block, so a block whose solid or empty
/// corners fall apart yields a vertex or an edge shared by separate sheets.
/// The outermost layer of `solid` is never filled. Returns the number of
/// voxels added.
fn close_diagonal_contacts(solid: &mut [bool], dims: [usize; 3]) -> usize {
    let [nx, ny, nz] = dims;
    if nx < 2 || ny < 2 || nz < 2 {
        return 0;
    }
    let index = |x: usize, y: usize, z: usize| x + y * nx + z * nx * ny;
    let on_border = |x: usize, y: usize, z: usize| {
        x == 0 || y == 0 || z == 0 || x == nx - 1 || y == ny - 1 || z == nz - 1
    };
    let corner = |x: usize, y: usize, z: usize, c: usize| {
        (x + (c & 1), y + ((c >> 1) & 1), z + (c >> 2))
    };

    let mut total = 0;
    loop {
        let mut added = 0;
        for z in 0..nz - 1 {
            for y in 0..ny - 1 {
                for x in 0..nx - 1 {
                    let mut mask = 0u8;
                    let mut frozen = 0u8;
                    for c in 0..8 {
                        let (px, py, pz) = corner(x, y, z, c);
                        if solid[index(px, py, pz)] {
                            mask |= 1 << c;
                        }
                        if on_border(px, py, pz) {
                            frozen |= 1 << c;
                        }
                    }
                    if mask == 0 || mask == u8::MAX {
                        continue;
                    }

                    let new = bridge_block(mask, frozen) & !mask;
                    for c in 0..8 {
                        if new & (1 << c) != 0 {
                            let (px, py, pz) = corner(x, y, z, c);
                            solid[index(px, py, pz)] = true;
                            added += 1;
                        }
                    }
                }
            }
        }
        if added == 0 {
            return total;
        }
        total += added;
    }
}

/// Corners of a 2x2x2 block as bits, corner `c` at `(c & 1, c >> 1 & 1, c >> 2)`.
/// Returns `solid` grown until the solid and the empty corners are each one
/// face-connected part. `frozen` corners stay empty.
fn bridge_block(solid: u8, frozen: u8) -> u8 {
    let mut solid = solid;

    loop {
        let (parts, count) = components(solid);
        if count <= 1 {
            break;
        }
        let first = parts[0];
        let rest = solid & !first;
        let candidates = neighbours(first) & !frozen;
        let bridges = candidates & neighbours(rest);
        let pick = if bridges != 0 { bridges } else { candidates };
        if pick == 0 {
            break;
        }
        // Lowest set bit
        solid |= pick & pick.wrapping_neg();
    }

    let empty = !solid;
    let (parts, count) = components(empty);
    if count > 1 {
        let parts = &parts[..count];
        let keep = parts
            .iter()
            .copied()
            .find(|p| p & frozen != 0)
            .or_else(|| parts.iter().copied().max_by_key(|p| p.count_ones()))
            .unwrap_or(0);
        solid |= empty & !keep;
    }
    solid
}

/// Face-connected parts of the corners in `mask`.
fn components(mask: u8) -> ([u8; 8], usize) {
    let mut parts = [0u8; 8];
    let mut count = 0;
    let mut seen = 0u8;
    for start in 0..8 {
        let bit = 1u8 << start;
        if mask & bit == 0 || seen & bit != 0 {
            continue;
        }
        let mut part = bit;
        loop {
            let grown = part | (neighbours(part) & mask);
            if grown == part {
                break;
            }
            part = grown;
        }
        seen |= part;
        parts[count] = part;
        count += 1;
    }
    (parts, count)
}

/// Corners sharing a block edge with a corner in `mask`, excluding `mask`.
fn neighbours(mask: u8) -> u8 {
    let mut out = 0u8;
    for c in 0..8 {
        if mask & (1 << c) != 0 {
            out |= (1 << (c ^ 1)) | (1 << (c ^ 2)) | (1 << (c ^ 4));
        }
    }
    out & !mask
}
