//! External extractor supervision against fake extractor scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use bimprint_extract::{
    AcquisitionAdapter, ExternalExtractorConfig, ExtractError, ExtractionConfig, ExtractorRunner,
    ObjSceneKernel, discover_output,
};
use tempfile::TempDir;

// Writing a script while another test forks can leave it busy at exec time
static SCRIPTS: Mutex<()> = Mutex::new(());

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// OBJ text of a box with each side split into `n * n` quads, unwelded.
fn tessellated_box_obj(n: usize, size: f64) -> String {
    let mut out = String::from("o envelope\n");
    let mut count = 0;
    let step = size / n as f64;
    // (origin, u axis, v axis) per side
    let sides: [([f64; 3], [f64; 3], [f64; 3]); 6] = [
        ([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, size], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, size, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([size, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
    ];
    for (origin, u, v) in sides {
        for i in 0..n {
            for j in 0..n {
                for (a, b) in [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)] {
                    let (a, b) = (a as f64 * step, b as f64 * step);
                    out.push_str(&format!(
                        "v {} {} {}\n",
                        origin[0] + u[0] * a + v[0] * b,
                        origin[1] + u[1] * a + v[1] * b,
                        origin[2] + u[2] * a + v[2] * b
                    ));
                }
                out.push_str(&format!(
                    "f {} {} {}\nf {} {} {}\n",
                    count + 1,
                    count + 2,
                    count + 3,
                    count + 1,
                    count + 3,
                    count + 4
                ));
                count += 4;
            }
        }
    }
    out
}

fn runner(exe: &Path, work: &Path, timeout_secs: u64) -> ExtractorRunner {
    let config = ExternalExtractorConfig {
        timeout_secs,
        ..ExternalExtractorConfig::new(exe)
    };
    ExtractorRunner::new(config, work)
}

#[test]
fn test_failing_extractor_reports_code_and_stderr() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(dir.path(), "extractor", "echo 'bad input' >&2\nexit 3");

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let config = runner.write_config(Path::new("model.ifc")).unwrap();
    let err = runner.run(&exe, &config).unwrap_err();

    match err {
        ExtractError::ExtractorFailed { code, stderr } => {
            assert_eq!(code, 3);
            assert_eq!(stderr, "bad input");
        }
        other => panic!("Expected ExtractorFailed, got {other:?}"),
    }
}

#[test]
fn test_extractor_receives_config_path() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(
        dir.path(),
        "extractor",
        "grep -q '\"Threads\": 8' \"$1\" || exit 9",
    );

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let config = runner.write_config(Path::new("model.ifc")).unwrap();
    runner.run(&exe, &config).unwrap();
}

#[test]
fn test_hung_extractor_is_killed() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(dir.path(), "extractor", "exec sleep 30");

    let runner = runner(&exe, &dir.path().join("work"), 1);
    let config = runner.write_config(Path::new("model.ifc")).unwrap();

    let start = std::time::Instant::now();
    let err = runner.run(&exe, &config).unwrap_err();
    assert!(matches!(err, ExtractError::ExtractorTimeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(20));
}

#[test]
fn test_timeout_kills_extractor_children() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    // The shell forks sleep, which inherits stdout and stderr
    let exe = write_script(dir.path(), "extractor", "echo starting\nsleep 8\necho done");

    let runner = runner(&exe, &dir.path().join("work"), 1);
    let config = runner.write_config(Path::new("model.ifc")).unwrap();

    let start = std::time::Instant::now();
    let err = runner.run(&exe, &config).unwrap_err();
    assert!(matches!(err, ExtractError::ExtractorTimeout { .. }));
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "run returned after {:?}",
        start.elapsed()
    );
}

#[test]
fn test_background_helper_does_not_block_run() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(dir.path(), "extractor", "sleep 8 &\nexit 0");

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let config = runner.write_config(Path::new("model.ifc")).unwrap();

    let start = std::time::Instant::now();
    runner.run(&exe, &config).unwrap();
    assert!(start.elapsed() < Duration::from_secs(6));
}

#[test]
fn test_newest_output_is_loaded() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");

    let fixture = dir.path().join("fixture.obj");
    fs::write(&fixture, tessellated_box_obj(5, 10.0)).unwrap();
    let exe = write_script(
        dir.path(),
        "extractor",
        &format!(
            "out=\"$(dirname \"$1\")/extractor_output/lod22\"\nmkdir -p \"$out\"\ncp '{}' \"$out/envelope.obj\"",
            fixture.display()
        ),
    );

    // A stale result from an earlier run, too small to pass the sanity check
    let runner = runner(&exe, &work, 60);
    fs::create_dir_all(runner.output_dir()).unwrap();
    let stale = runner.output_dir().join("old.obj");
    fs::write(&stale, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
    fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
        .unwrap();

    let mesh = runner.extract(Path::new("model.ifc"), &exe).unwrap();
    assert_eq!(mesh.face_count(), 300);

    let found = discover_output(&runner.output_dir(), "obj").unwrap();
    assert_eq!(found.file_name().unwrap(), "envelope.obj");
}

#[test]
fn test_tiny_output_rejected() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(
        dir.path(),
        "extractor",
        "out=\"$(dirname \"$1\")/extractor_output\"\nprintf 'v 0 0 0\\nv 1 0 0\\nv 0 1 0\\nf 1 2 3\\n' > \"$out/envelope.obj\"",
    );

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let err = runner.extract(Path::new("model.ifc"), &exe).unwrap_err();
    assert!(matches!(err, ExtractError::InvalidExtractorOutput { .. }));
}

#[test]
fn test_flat_output_rejected() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();

    // 10 x 10 quads in the z = 0 plane: enough faces, no height
    let mut flat = String::new();
    for j in 0..=10 {
        for i in 0..=10 {
            flat.push_str(&format!("v {} {} 0\n", i * 100, j * 100));
        }
    }
    for j in 0..10 {
        for i in 0..10 {
            let a = j * 11 + i + 1;
            flat.push_str(&format!("f {} {} {}\nf {} {} {}\n", a, a + 1, a + 12, a, a + 12, a + 11));
        }
    }
    let fixture = dir.path().join("flat.obj");
    fs::write(&fixture, flat).unwrap();

    let exe = write_script(
        dir.path(),
        "extractor",
        &format!(
            "cp '{}' \"$(dirname \"$1\")/extractor_output/envelope.obj\"",
            fixture.display()
        ),
    );

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let err = runner.extract(Path::new("model.ifc"), &exe).unwrap_err();
    match err {
        ExtractError::InvalidExtractorOutput { ref reason, .. } => {
            assert!(reason.contains("degenerate extents"), "{reason}");
        }
        other => panic!("Expected InvalidExtractorOutput, got {other:?}"),
    }
}

#[test]
fn test_no_output_written() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let exe = write_script(dir.path(), "extractor", "exit 0");

    let runner = runner(&exe, &dir.path().join("work"), 60);
    let err = runner.extract(Path::new("model.ifc"), &exe).unwrap_err();
    assert!(matches!(err, ExtractError::OutputNotFound { .. }));
}

#[test]
fn test_adapter_selects_extractor_by_schema() {
    let _guard = SCRIPTS.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();

    let fixture = dir.path().join("fixture.obj");
    fs::write(&fixture, tessellated_box_obj(4, 1000.0)).unwrap();

    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    let copy_fixture = format!(
        "cp '{}' \"$(dirname \"$1\")/extractor_output/envelope.obj\"",
        fixture.display()
    );
    write_script(&bin, "extractor_ifc2x3", &copy_fixture);
    write_script(&bin, "extractor_ifc4", "echo 'wrong schema' >&2\nexit 1");

    let model = dir.path().join("model.ifc");
    fs::write(
        &model,
        "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('IFC2X3'));\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n",
    )
    .unwrap();

    let config = ExtractionConfig {
        external: Some(ExternalExtractorConfig::new(&bin)),
        ..Default::default()
    };
    let mut adapter = AcquisitionAdapter::new(ObjSceneKernel, config, dir.path().join("work"));

    let mesh = adapter.acquire(&model).unwrap();
    assert_eq!(mesh.face_count(), 192);
    assert_eq!(
        adapter.cached_extractor().unwrap().file_name().unwrap(),
        "extractor_ifc2x3"
    );
}
