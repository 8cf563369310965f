//! Tracing helpers for pipeline stages.
//!
//! Enable output by installing a subscriber in the binary, for example with
//! `RUST_LOG=bimprint=debug`. Timing events use the `bimprint::timing`
//! target and mesh snapshots use `bimprint::mesh_state`, so either can be
//! filtered on its own.

use std::time::Instant;
use tracing::{Span, debug, info};

use crate::Mesh;

/// A stage timer that logs its duration on drop.
///
/// ```rust,ignore
/// use bimprint_mesh::tracing_ext::OperationTimer;
///
/// let _timer = OperationTimer::with_mesh("thicken_walls", &mesh);
/// // ... work ...
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Start timing `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("stage", operation = name);
        debug!(target: "bimprint::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Start timing `name`, recording the size of the input mesh.
    pub fn with_mesh(name: &'static str, mesh: &Mesh) -> Self {
        let span = tracing::info_span!(
            "stage",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count()
        );
        debug!(
            target: "bimprint::timing",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count(),
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "bimprint::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let dims = mesh.extents().unwrap_or_default();

    debug!(
        target: "bimprint::mesh_state",
        context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_mesh_stats_on_empty_mesh() {
        log_mesh_stats(&Mesh::new(), "test");
        let _t = OperationTimer::with_mesh("empty", &Mesh::new());
    }
}
