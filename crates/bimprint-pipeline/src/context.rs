//! Per-run directories and identity.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bimprint_mesh::ExportFormat;

use crate::error::{PipelineError, PipelineResult};

/// Where one run writes its files.
///
/// Runs sharing an `output_root` must use distinct run ids; the work
/// directory is keyed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub output_root: PathBuf,
    pub run_id: String,
    /// Log file requested for this run, if any.
    pub log_file: Option<PathBuf>,
}

impl RunContext {
    /// Context with a run id derived from the clock and process id.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_run_id(output_root, format!("{}-{}", secs, std::process::id()))
    }

    pub fn with_run_id(output_root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            output_root: output_root.into(),
            run_id: run_id.into(),
            log_file: None,
        }
    }

    /// Also log to `<output_root>/logs/bimprint.log`.
    pub fn with_log_file(mut self) -> Self {
        self.log_file = Some(self.output_root.join("logs").join("bimprint.log"));
        self
    }

    /// Scratch space for the external extractor.
    pub fn work_dir(&self) -> PathBuf {
        self.output_root.join("work").join(&self.run_id)
    }

    /// `<output_root>/<model stem>.<ext>`.
    pub fn default_output(&self, model_path: &Path, format: ExportFormat) -> PathBuf {
        let stem = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        self.output_root
            .join(format!("{}.{}", stem, format.extension()))
    }

    /// Create the output root, work directory and log directory.
    pub fn prepare(&self) -> PipelineResult<()> {
        let mut dirs = vec![self.output_root.clone(), self.work_dir()];
        if let Some(parent) = self.log_file.as_deref().and_then(Path::parent) {
            dirs.push(parent.to_path_buf());
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| {
                PipelineError::io(format!("failed to create {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let ctx = RunContext::with_run_id("/out", "r1").with_log_file();
        assert_eq!(ctx.work_dir(), PathBuf::from("/out/work/r1"));
        assert_eq!(ctx.log_file, Some(PathBuf::from("/out/logs/bimprint.log")));
        assert_eq!(
            ctx.default_output(Path::new("/models/house.ifc"), ExportFormat::Fbx),
            PathBuf::from("/out/house.fbx")
        );
    }

    #[test]
    fn test_prepare_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let ctx = RunContext::with_run_id(dir.path().join("out"), "r2").with_log_file();
        ctx.prepare().unwrap();
        assert!(ctx.work_dir().is_dir());
        assert!(dir.path().join("out/logs").is_dir());
    }

    #[test]
    fn test_generated_run_id() {
        let ctx = RunContext::new("out");
        assert!(ctx.run_id.ends_with(&std::process::id().to_string()));
        assert!(ctx.log_file.is_none());
    }
}
