//! Mesh file I/O: STL and OBJ input, STL / OBJ / FBX output.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Vertex};

/// Output format of the final solid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Binary STL.
    #[default]
    Stl,
    /// Wavefront OBJ.
    Obj,
    /// ASCII FBX 7.4.
    Fbx,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Stl => "stl",
            ExportFormat::Obj => "obj",
            ExportFormat::Fbx => "fbx",
        }
    }

    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stl" => Ok(ExportFormat::Stl),
            "obj" => Ok(ExportFormat::Obj),
            "fbx" => Ok(ExportFormat::Fbx),
            other => Err(MeshError::UnsupportedFormat {
                extension: Some(other.to_string()),
            }),
        }
    }
}

fn unsupported(path: &Path) -> MeshError {
    MeshError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    }
}

/// Load a mesh from an STL or OBJ file, detecting the format from the
/// extension. All OBJ objects are merged.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let mesh = match ext.as_deref() {
        Some("stl") => load_stl(path)?,
        Some("obj") => {
            let objects = load_obj_objects(path)?;
            Mesh::concatenate(objects.iter().map(|(_, m)| m))
        }
        _ => return Err(unsupported(path)),
    };

    if mesh.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "{} has no faces",
            path.display()
        )));
    }

    info!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Loaded mesh"
    );
    if let Some((min, max)) = mesh.bounds() {
        debug!(
            "Bounding box: [{:.1}, {:.1}, {:.1}] to [{:.1}, {:.1}, {:.1}]",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }

    Ok(mesh)
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices.push(Vertex::from_coords(
            v.0[0] as f64,
            v.0[1] as f64,
            v.0[2] as f64,
        ));
    }
    for face in &stl.faces {
        mesh.faces.push([
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ]);
    }

    debug!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        "STL parsed"
    );
    Ok(mesh)
}

/// Load every object of an OBJ file as a separate named mesh.
///
/// Polygons are triangulated. Objects without faces are kept so callers
/// can report them.
pub fn load_obj_objects(path: &Path) -> MeshResult<Vec<(String, Mesh)>> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| match e {
        tobj::LoadError::OpenFileFailed => MeshError::IoRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
        },
        other => MeshError::parse_error(path, other.to_string()),
    })?;

    let objects = models
        .into_iter()
        .map(|model| {
            let positions: Vec<[f64; 3]> = model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|c| [c[0] as f64, c[1] as f64, c[2] as f64])
                .collect();
            let faces: Vec<[u32; 3]> = model
                .mesh
                .indices
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            (model.name, Mesh::from_buffers(&positions, &faces))
        })
        .collect::<Vec<_>>();

    debug!(objects = objects.len(), path = %path.display(), "OBJ parsed");
    Ok(objects)
}

/// Write `mesh` to `path` in `format` and check that something was written.
///
/// Returns the size of the written file in bytes.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] when there is nothing to write.
/// - [`MeshError::IoWrite`] on I/O failure.
/// - [`MeshError::EmptyExport`] when the file ends up empty.
pub fn export_mesh(mesh: &Mesh, path: &Path, format: ExportFormat) -> MeshResult<u64> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("refusing to export a mesh without faces"));
    }
    if let Some(from_ext) = ExportFormat::from_path(path)
        && from_ext != format
    {
        warn!(
            path = %path.display(),
            %format,
            "File extension does not match export format"
        );
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| MeshError::io_write(parent, e))?;
    }

    match format {
        ExportFormat::Stl => save_stl(mesh, path)?,
        ExportFormat::Obj => save_obj(mesh, path)?,
        ExportFormat::Fbx => save_fbx(mesh, path)?,
    }

    let size = std::fs::metadata(path)
        .map_err(|e| MeshError::io_write(path, e))?
        .len();
    if size == 0 {
        return Err(MeshError::EmptyExport {
            path: path.to_path_buf(),
        });
    }

    info!(
        path = %path.display(),
        %format,
        bytes = size,
        faces = mesh.face_count(),
        "Exported mesh"
    );
    Ok(size)
}

/// Save mesh to STL file (binary format).
pub fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal().unwrap_or_else(nalgebra::Vector3::zeros);
            let v = |p: nalgebra::Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [v(tri.v0), v(tri.v1), v(tri.v2)],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;

    debug!(triangles = triangles.len(), "Wrote binary STL");
    Ok(())
}

/// Save mesh to OBJ file.
pub fn save_obj(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut w = BufWriter::new(file);
    write_obj(mesh, &mut w)
        .and_then(|()| w.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

fn write_obj(mesh: &Mesh, w: &mut impl Write) -> std::io::Result<()> {
    writeln!(w, "# bimprint envelope")?;
    writeln!(w, "# Vertices: {}", mesh.vertices.len())?;
    writeln!(w, "# Faces: {}", mesh.faces.len())?;
    writeln!(w, "o envelope")?;

    for v in &mesh.vertices {
        writeln!(w, "v {:.6} {:.6} {:.6}", v.position.x, v.position.y, v.position.z)?;
    }

    let has_normals = mesh.vertices.iter().all(|v| v.normal.is_some());
    if has_normals {
        for n in mesh.vertices.iter().filter_map(|v| v.normal) {
            writeln!(w, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }

    // 1-based indices
    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if has_normals {
            writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }
    Ok(())
}

/// Save mesh as an ASCII FBX 7.4 document with a single mesh model.
///
/// Coordinates are millimeters; the document declares a unit scale of 0.1
/// (FBX units are centimeters) and Z up.
pub fn save_fbx(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut w = BufWriter::new(file);
    write_fbx(mesh, &mut w)
        .and_then(|()| w.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

const FBX_GEOMETRY_ID: u64 = 1_000_001;
const FBX_MODEL_ID: u64 = 1_000_002;

fn write_fbx(mesh: &Mesh, w: &mut impl Write) -> std::io::Result<()> {
    writeln!(w, "; FBX 7.4.0 project file")?;
    writeln!(w, "FBXHeaderExtension:  {{")?;
    writeln!(w, "\tFBXHeaderVersion: 1003")?;
    writeln!(w, "\tFBXVersion: 7400")?;
    writeln!(w, "\tCreator: \"bimprint\"")?;
    writeln!(w, "}}")?;

    writeln!(w, "GlobalSettings:  {{")?;
    writeln!(w, "\tVersion: 1000")?;
    writeln!(w, "\tProperties70:  {{")?;
    writeln!(w, "\t\tP: \"UpAxis\", \"int\", \"Integer\", \"\",2")?;
    writeln!(w, "\t\tP: \"UpAxisSign\", \"int\", \"Integer\", \"\",1")?;
    writeln!(w, "\t\tP: \"FrontAxis\", \"int\", \"Integer\", \"\",1")?;
    writeln!(w, "\t\tP: \"FrontAxisSign\", \"int\", \"Integer\", \"\",-1")?;
    writeln!(w, "\t\tP: \"UnitScaleFactor\", \"double\", \"Number\", \"\",0.1")?;
    writeln!(w, "\t}}")?;
    writeln!(w, "}}")?;

    writeln!(w, "Objects:  {{")?;
    writeln!(w, "\tGeometry: {FBX_GEOMETRY_ID}, \"Geometry::envelope\", \"Mesh\" {{")?;

    writeln!(w, "\t\tVertices: *{} {{", mesh.vertices.len() * 3)?;
    let coords: Vec<String> = mesh
        .vertices
        .iter()
        .flat_map(|v| [v.position.x, v.position.y, v.position.z])
        .map(|c| format!("{c:.6}"))
        .collect();
    writeln!(w, "\t\t\ta: {}", coords.join(","))?;
    writeln!(w, "\t\t}}")?;

    // The last index of each polygon is stored as -(i + 1).
    writeln!(w, "\t\tPolygonVertexIndex: *{} {{", mesh.faces.len() * 3)?;
    let indices: Vec<String> = mesh
        .faces
        .iter()
        .flat_map(|&[a, b, c]| [a as i64, b as i64, -(c as i64) - 1])
        .map(|i| i.to_string())
        .collect();
    writeln!(w, "\t\t\ta: {}", indices.join(","))?;
    writeln!(w, "\t\t}}")?;
    writeln!(w, "\t\tGeometryVersion: 124")?;
    writeln!(w, "\t}}")?;

    writeln!(w, "\tModel: {FBX_MODEL_ID}, \"Model::envelope\", \"Mesh\" {{")?;
    writeln!(w, "\t\tVersion: 232")?;
    writeln!(w, "\t\tShading: T")?;
    writeln!(w, "\t}}")?;
    writeln!(w, "}}")?;

    writeln!(w, "Connections:  {{")?;
    writeln!(w, "\tC: \"OO\",{FBX_GEOMETRY_ID},{FBX_MODEL_ID}")?;
    writeln!(w, "\tC: \"OO\",{FBX_MODEL_ID},0")?;
    writeln!(w, "}}")?;
    Ok(())
}
