//! End-to-end integration tests for bimprint-mesh.
//!
//! These tests exercise the mesh stages in pipeline order:
//! normalize -> simplify -> repair -> scale -> validate -> export.

use approx::assert_relative_eq;
use bimprint_mesh::{
    ExportFormat, Mesh, MeshError, MeshUnits, PrinterVolume, SimplifyLevel, ThicknessEstimate,
    Vertex, detect_units, ensure_watertight, load_obj_objects, normalize_to_millimeters,
    scale_for_printer, simplify, smooth_surface, validate_for_printing,
};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

/// Create a closed box with CCW winding when viewed from outside.
fn create_test_box(x: f64, y: f64, z: f64) -> Mesh {
    let mut mesh = Mesh::new();

    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0)); // 0
    mesh.vertices.push(Vertex::from_coords(x, 0.0, 0.0)); // 1
    mesh.vertices.push(Vertex::from_coords(x, y, 0.0)); // 2
    mesh.vertices.push(Vertex::from_coords(0.0, y, 0.0)); // 3
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, z)); // 4
    mesh.vertices.push(Vertex::from_coords(x, 0.0, z)); // 5
    mesh.vertices.push(Vertex::from_coords(x, y, z)); // 6
    mesh.vertices.push(Vertex::from_coords(0.0, y, z)); // 7

    // Bottom
    mesh.faces.push([0, 2, 1]);
    mesh.faces.push([0, 3, 2]);
    // Top
    mesh.faces.push([4, 5, 6]);
    mesh.faces.push([4, 6, 7]);
    // Front
    mesh.faces.push([0, 1, 5]);
    mesh.faces.push([0, 5, 4]);
    // Back
    mesh.faces.push([3, 7, 6]);
    mesh.faces.push([3, 6, 2]);
    // Left
    mesh.faces.push([0, 4, 7]);
    mesh.faces.push([0, 7, 3]);
    // Right
    mesh.faces.push([1, 2, 6]);
    mesh.faces.push([1, 6, 5]);

    mesh
}

/// UV sphere, closed and outward facing.
fn create_sphere(rings: u32, segments: u32, radius: f64) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, radius));
    for r in 1..rings {
        let phi = std::f64::consts::PI * r as f64 / rings as f64;
        for s in 0..segments {
            let theta = 2.0 * std::f64::consts::PI * s as f64 / segments as f64;
            mesh.vertices.push(Vertex::from_coords(
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ));
        }
    }
    let south = mesh.vertices.len() as u32;
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -radius));

    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);
    for s in 0..segments {
        mesh.faces.push([0, ring(1, s), ring(1, s + 1)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            mesh.faces.push([a, c, d]);
            mesh.faces.push([a, d, b]);
        }
    }
    for s in 0..segments {
        mesh.faces.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    mesh
}

// =============================================================================
// Unit handling
// =============================================================================

#[test]
fn test_meter_model_is_scaled_to_millimeters() {
    let mesh = create_test_box(30.0, 20.0, 10.0);
    assert_eq!(detect_units(&mesh).unwrap(), MeshUnits::Meters);

    let (mm, factor) = normalize_to_millimeters(&mesh).unwrap();
    assert_relative_eq!(factor, 1000.0);
    let extents = mm.extents().unwrap();
    assert_relative_eq!(extents.x, 30000.0, epsilon = 1e-6);
    assert_relative_eq!(extents.z, 10000.0, epsilon = 1e-6);
}

#[test]
fn test_millimeter_model_is_untouched() {
    let mesh = create_test_box(30000.0, 20000.0, 10000.0);
    let (mm, factor) = normalize_to_millimeters(&mesh).unwrap();
    assert_relative_eq!(factor, 1.0);
    for (a, b) in mm.vertices.iter().zip(&mesh.vertices) {
        assert_eq!(a.position, b.position);
    }
}

// =============================================================================
// Simplify, smooth, repair
// =============================================================================

#[test]
fn test_simplify_levels_are_ordered() {
    let sphere = create_sphere(32, 64, 50.0);
    let original = sphere.face_count();

    let low = simplify(&sphere, SimplifyLevel::Low).unwrap();
    let medium = simplify(&sphere, SimplifyLevel::Medium).unwrap();
    let high = simplify(&sphere, SimplifyLevel::High).unwrap();

    assert!(low.face_count() <= medium.face_count());
    assert!(medium.face_count() <= high.face_count());
    assert!(high.face_count() <= original);
    assert!(low.face_count() >= 100);
}

#[test]
fn test_simplify_small_mesh_keeps_floor() {
    let cube = create_test_box(10.0, 10.0, 10.0);
    let out = simplify(&cube, SimplifyLevel::Low).unwrap();
    assert_eq!(out.face_count(), 12);
}

#[test]
fn test_simplify_then_repair_stays_closed() {
    let sphere = create_sphere(24, 48, 20.0);
    let simplified = simplify(&sphere, SimplifyLevel::Medium).unwrap();
    let repaired = ensure_watertight(&simplified).unwrap();

    assert!(repaired.is_watertight());
    assert!(repaired.signed_volume() > 0.0);
}

#[test]
fn test_smoothing_shrinks_but_keeps_topology() {
    let sphere = create_sphere(16, 32, 10.0);
    let smoothed = smooth_surface(&sphere, 3).unwrap();

    assert_eq!(smoothed.face_count(), sphere.face_count());
    assert_eq!(smoothed.faces, sphere.faces);
    assert!(smoothed.max_extent().unwrap() <= sphere.max_extent().unwrap() + 1e-9);
    assert!(smoothed.is_watertight());
}

#[test]
fn test_repair_fixes_open_inverted_box() {
    let mut mesh = create_test_box(10.0, 10.0, 10.0);
    mesh.faces.truncate(10);
    for face in &mut mesh.faces {
        face.swap(1, 2);
    }

    let repaired = ensure_watertight(&mesh).unwrap();
    assert!(repaired.is_watertight());
    assert_relative_eq!(repaired.signed_volume(), 1000.0, epsilon = 1e-6);
}

// =============================================================================
// Printer fit and validation
// =============================================================================

#[test]
fn test_building_scaled_into_printer() {
    let mesh = create_test_box(30000.0, 20000.0, 10000.0);
    let fitted = scale_for_printer(&mesh, 200.0).unwrap();
    let extents = fitted.extents().unwrap();

    assert!(extents.x <= 200.0 + 1e-9);
    assert!(extents.y <= 200.0 + 1e-9);
    assert!(extents.z <= 200.0 + 1e-9);
    assert_relative_eq!(extents.x / extents.y, 1.5, epsilon = 1e-9);
}

#[test]
fn test_box_printer_volume() {
    let mesh = create_test_box(900.0, 450.0, 225.0);
    let fitted = scale_for_printer(&mesh, PrinterVolume::Box([250.0, 210.0, 210.0])).unwrap();
    let extents = fitted.extents().unwrap();
    assert!(extents.x <= 250.0 + 1e-9);
    assert!(extents.y <= 210.0 + 1e-9);
}

#[test]
fn test_validation_of_slab() {
    let mesh = create_test_box(100.0, 100.0, 3.0);
    let report = validate_for_printing(&mesh, 200).unwrap();

    assert!(report.is_watertight);
    assert!(report.has_correct_normals);
    assert_relative_eq!(report.volume, 30000.0, epsilon = 1e-6);
    match report.min_wall_thickness {
        ThicknessEstimate::Exact(t) => assert!(t > 2.9 && t <= 3.0 + 1e-6),
        other => panic!("expected exact thickness, got {other:?}"),
    }
    assert!(report.is_printable(2.0));
    assert!(!report.is_printable(5.0));
}

#[test]
fn test_validation_is_deterministic() {
    let sphere = create_sphere(12, 24, 5.0);
    let a = validate_for_printing(&sphere, 64).unwrap();
    let b = validate_for_printing(&sphere, 64).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_report_serializes_thickness_kind() {
    let report = validate_for_printing(&create_test_box(4.0, 4.0, 4.0), 32).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["is_watertight"], true);
    assert_eq!(json["min_wall_thickness"]["kind"], "exact");
    assert_eq!(json["bounding_box"].as_array().unwrap().len(), 6);
}

// =============================================================================
// I/O
// =============================================================================

#[test]
fn test_export_all_formats() {
    let dir = TempDir::new().unwrap();
    let mesh = create_test_box(20.0, 20.0, 20.0);

    for format in [ExportFormat::Stl, ExportFormat::Obj, ExportFormat::Fbx] {
        let path = dir.path().join(format!("out.{}", format.extension()));
        let size = mesh.export(&path, format).unwrap();
        assert!(size > 0, "{format} export is empty");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
    }
}

#[test]
fn test_stl_round_trip_preserves_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("box.stl");
    let mesh = create_test_box(12.0, 8.0, 4.0);

    mesh.export(&path, ExportFormat::Stl).unwrap();
    let loaded = Mesh::load(&path).unwrap();

    assert_eq!(loaded.face_count(), 12);
    assert_relative_eq!(loaded.volume(), mesh.volume(), epsilon = 1e-3);
}

#[test]
fn test_obj_objects_keep_names() {
    let mut file = NamedTempFile::with_suffix(".obj").unwrap();
    writeln!(
        file,
        "o IfcWall:12\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n\
         o IfcSlab:40\nv 0 0 1\nv 1 0 1\nv 0 1 1\nf 4 5 6"
    )
    .unwrap();
    file.flush().unwrap();

    let objects = load_obj_objects(file.path()).unwrap();
    let names: Vec<_> = objects.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["IfcWall:12", "IfcSlab:40"]);

    let merged = Mesh::load(file.path()).unwrap();
    assert_eq!(merged.face_count(), 2);
    assert_eq!(merged.vertex_count(), 6);
}

#[test]
fn test_load_missing_file() {
    let err = Mesh::load("/nonexistent/model.obj").unwrap_err();
    assert!(matches!(err, MeshError::IoRead { .. }));
}

#[test]
fn test_unsupported_extension() {
    let err = "step".parse::<ExportFormat>().unwrap_err();
    assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
}

// =============================================================================
// Full chain
// =============================================================================

#[test]
fn test_full_mesh_chain() {
    let dir = TempDir::new().unwrap();
    let building = create_sphere(24, 48, 15.0);

    let (mm, _) = normalize_to_millimeters(&building).unwrap();
    let simplified = simplify(&mm, SimplifyLevel::Medium).unwrap();
    let repaired = ensure_watertight(&simplified).unwrap();
    let fitted = scale_for_printer(&repaired, 200.0).unwrap();
    let report = validate_for_printing(&fitted, 100).unwrap();

    assert!(report.is_watertight);
    assert!(report.has_correct_normals);
    assert!(fitted.max_extent().unwrap() <= 200.0 + 1e-9);

    let out = dir.path().join("building.stl");
    assert!(fitted.export(&out, ExportFormat::Stl).unwrap() > 0);
}
