//! Supervision of the external envelope extractor.
//!
//! One run goes through five steps, each of which can fail on its own:
//! resolve the executable, write the JSON configuration, run the process
//! under a timeout, find the newest output mesh and sanity-check it.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use command_group::{CommandGroup, GroupChild};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use bimprint_mesh::tracing_ext::OperationTimer;
use bimprint_mesh::{Mesh, MeshError, load_mesh};

use crate::config::ExternalExtractorConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::schema::{detect_schema, select_extractor};

/// File name of the generated configuration inside the work directory.
pub const CONFIG_FILE_NAME: &str = "extractor_config.json";

/// Directory below the work directory the extractor writes into.
pub const OUTPUT_DIR_NAME: &str = "extractor_output";

/// Output meshes with this many faces or fewer are rejected.
pub const MIN_OUTPUT_FACES: usize = 100;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading captured output once the extractor is gone.
/// A descendant that outlived the group kill may still hold the pipes.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Runs the external extractor for one work directory.
#[derive(Debug, Clone)]
pub struct ExtractorRunner {
    config: ExternalExtractorConfig,
    work_dir: PathBuf,
}

impl ExtractorRunner {
    pub fn new(config: ExternalExtractorConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
        }
    }

    pub fn config(&self) -> &ExternalExtractorConfig {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.work_dir.join(CONFIG_FILE_NAME)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join(OUTPUT_DIR_NAME)
    }

    /// Resolve the executable for `model_path`.
    ///
    /// A configured file is used as is. A directory is searched for the
    /// executable matching the model's declared schema.
    pub fn resolve_executable(&self, model_path: &Path) -> ExtractResult<PathBuf> {
        let path = &self.config.path;
        if path.is_file() {
            debug!(exe = %path.display(), "Using configured extractor");
            return Ok(path.clone());
        }
        if path.is_dir() {
            let schema = detect_schema(model_path)?;
            let exe = select_extractor(path, schema)?;
            info!(%schema, exe = %exe.display(), "Selected extractor for schema");
            return Ok(exe);
        }
        Err(ExtractError::extractor_not_found(path, "path does not exist"))
    }

    /// Native JSON configuration for one model.
    pub fn build_config(&self, model_path: &Path, output_dir: &Path) -> Value {
        let c = &self.config;
        json!({
            "Filepaths": {
                "Input": [model_path.display().to_string()],
                "Output": output_dir.join("envelope.city.json").display().to_string(),
                "Report": output_dir.join("envelope_report.json").display().to_string(),
            },
            "LoD output": c.lods,
            "Voxel": { "Size": c.voxel_size },
            "IFC": {},
            "JSON": {
                "Generate exterior": u8::from(c.generate_exterior),
                "Generate interior": u8::from(c.generate_interior),
            },
            "Output format": {
                "OBJ file": u8::from(c.output_obj),
                "STEP file": u8::from(c.output_step),
            },
            "Tolerances": {
                "Spatial": c.tolerances.spatial,
                "Angular": c.tolerances.angular,
                "Area": c.tolerances.area,
            },
            "Generate report": 1,
            "Threads": c.threads,
        })
    }

    /// Write the configuration to `<work_dir>/extractor_config.json`.
    pub fn write_config(&self, model_path: &Path) -> ExtractResult<PathBuf> {
        let output_dir = self.output_dir();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            ExtractError::io(format!("failed to create {}", output_dir.display()), e)
        })?;

        let config = self.build_config(model_path, &output_dir);
        let text = serde_json::to_string_pretty(&config)
            .map_err(|e| ExtractError::io("failed to serialize extractor config", e.into()))?;

        let path = self.config_path();
        std::fs::write(&path, text)
            .map_err(|e| ExtractError::io(format!("failed to write {}", path.display()), e))?;
        info!(path = %path.display(), "Saved extractor config");
        Ok(path)
    }

    /// Run `exe <config_path>` and wait up to the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::ExtractorFailed`] on a non-zero exit.
    /// - [`ExtractError::ExtractorTimeout`] when the child had to be killed.
    ///
    /// The extractor runs in its own process group, and a timeout kills the
    /// whole group so helpers it spawned do not outlive it.
    pub fn run(&self, exe: &Path, config_path: &Path) -> ExtractResult<()> {
        info!(exe = %exe.display(), config = %config_path.display(), "Running extractor");

        let mut child = Command::new(exe)
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .group_spawn()
            .map_err(|e| ExtractError::io(format!("failed to start {}", exe.display()), e))?;

        // Drain both pipes so a chatty child cannot block on a full buffer
        let stdout = capture(child.inner().stdout.take());
        let stderr = capture(child.inner().stderr.take());

        let status = wait_with_timeout(&mut child, self.config.timeout())?;
        let drain_deadline = Instant::now() + OUTPUT_GRACE;
        let stdout = collect(&stdout, drain_deadline, "stdout");
        let stderr = collect(&stderr, drain_deadline, "stderr");

        if !stdout.trim().is_empty() {
            info!(target: "bimprint::extractor", "Extractor stdout:\n{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            warn!(target: "bimprint::extractor", "Extractor stderr:\n{}", stderr.trim_end());
        }

        let Some(status) = status else {
            warn!(timeout_secs = self.config.timeout_secs, "Extractor timed out and was killed");
            return Err(ExtractError::ExtractorTimeout {
                timeout: self.config.timeout(),
            });
        };

        if !status.success() {
            return Err(ExtractError::ExtractorFailed {
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        info!("Extractor finished successfully");
        Ok(())
    }

    /// Configure, run and load with an already resolved executable.
    pub fn extract(&self, model_path: &Path, exe: &Path) -> ExtractResult<Mesh> {
        let _timer = OperationTimer::new("external_extractor");
        let config_path = self.write_config(model_path)?;
        self.run(exe, &config_path)?;
        let output = discover_output(&self.output_dir(), "obj")?;
        sanity_check(&output)
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        // The receiver is gone if the drain deadline passed
        let _ = tx.send(text);
    });
    rx
}

/// Captured output of one pipe, or an empty string once `deadline` passes.
fn collect(rx: &Receiver<String>, deadline: Instant, stream: &str) -> String {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(text) => text,
        Err(_) => {
            warn!(stream, "Extractor output still open after exit, not waiting for it");
            String::new()
        }
    }
}

/// `Ok(None)` means the process group was killed after `timeout`.
fn wait_with_timeout(
    child: &mut GroupChild,
    timeout: Duration,
) -> ExtractResult<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        let polled = child
            .try_wait()
            .map_err(|e| ExtractError::io("failed to poll extractor", e))?;
        if let Some(status) = polled {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            // Kill fails only if the group already exited; reap either way
            let _ = child.kill();
            child
                .wait()
                .map_err(|e| ExtractError::io("failed to reap extractor", e))?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Newest file below `dir` with `extension`, compared case-insensitively.
///
/// # Errors
///
/// [`ExtractError::OutputNotFound`] when there is none.
pub fn discover_output(dir: &Path, extension: &str) -> ExtractResult<PathBuf> {
    let newest = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.into_path())
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

    match newest {
        Some((_, path)) => {
            info!(path = %path.display(), "Found extractor output");
            Ok(path)
        }
        None => Err(ExtractError::OutputNotFound {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        }),
    }
}

/// Load the extractor output and reject implausible meshes.
pub fn sanity_check(path: &Path) -> ExtractResult<Mesh> {
    let mesh = load_mesh(path).map_err(|e| match e {
        MeshError::EmptyMesh { .. } => ExtractError::invalid_output(path, "mesh is empty"),
        other => other.into(),
    })?;
    if mesh.face_count() <= MIN_OUTPUT_FACES {
        return Err(ExtractError::invalid_output(
            path,
            format!(
                "only {} faces, expected more than {}",
                mesh.face_count(),
                MIN_OUTPUT_FACES
            ),
        ));
    }
    let extents = mesh
        .extents()
        .ok_or_else(|| ExtractError::invalid_output(path, "mesh has no bounds"))?;
    if extents.iter().any(|e| !e.is_finite() || *e <= 0.0) {
        return Err(ExtractError::invalid_output(
            path,
            format!(
                "degenerate extents [{}, {}, {}]",
                extents.x, extents.y, extents.z
            ),
        ));
    }

    info!(
        faces = mesh.face_count(),
        vertices = mesh.vertex_count(),
        "Extractor output accepted"
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_config_keys() {
        let runner = ExtractorRunner::new(ExternalExtractorConfig::new("/opt/x"), "/tmp/work");
        let config = runner.build_config(Path::new("/data/model.ifc"), Path::new("/tmp/out"));

        assert_eq!(config["Filepaths"]["Input"][0], "/data/model.ifc");
        assert_eq!(config["Filepaths"]["Output"], "/tmp/out/envelope.city.json");
        assert_eq!(config["Filepaths"]["Report"], "/tmp/out/envelope_report.json");
        assert_eq!(config["LoD output"][0], 2.2);
        assert_eq!(config["Voxel"]["Size"], 1.0);
        assert!(config["IFC"].as_object().unwrap().is_empty());
        assert_eq!(config["JSON"]["Generate exterior"], 1);
        assert_eq!(config["JSON"]["Generate interior"], 0);
        assert_eq!(config["Output format"]["OBJ file"], 1);
        assert_eq!(config["Output format"]["STEP file"], 0);
        assert_eq!(config["Tolerances"]["Spatial"], 0.01);
        assert_eq!(config["Tolerances"]["Angular"], 1.0);
        assert_eq!(config["Generate report"], 1);
        assert_eq!(config["Threads"], 8);
    }

    #[test]
    fn test_write_config_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("nested/work");
        let runner = ExtractorRunner::new(ExternalExtractorConfig::new("/opt/x"), &work);

        let path = runner.write_config(Path::new("model.ifc")).unwrap();
        assert_eq!(path, work.join(CONFIG_FILE_NAME));
        assert!(runner.output_dir().is_dir());

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["Threads"], 8);
    }

    #[test]
    fn test_missing_extractor_path() {
        let dir = TempDir::new().unwrap();
        let runner =
            ExtractorRunner::new(ExternalExtractorConfig::new(dir.path().join("nope")), dir.path());
        let err = runner.resolve_executable(Path::new("model.ifc")).unwrap_err();
        assert!(matches!(err, ExtractError::ExtractorNotFound { .. }));
    }

    #[test]
    fn test_discover_output_empty_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.json"), b"{}").unwrap();
        let err = discover_output(dir.path(), "obj").unwrap_err();
        assert!(matches!(err, ExtractError::OutputNotFound { .. }));
    }

    #[test]
    fn test_discover_output_case_insensitive_and_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("lod22");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("ENVELOPE.OBJ"), b"").unwrap();
        let found = discover_output(dir.path(), "obj").unwrap();
        assert_eq!(found, nested.join("ENVELOPE.OBJ"));
    }
}
