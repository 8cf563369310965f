//! Building model to print-ready solid.
//!
//! Ties acquisition, unit normalization, envelope extraction and the
//! optimizer stages together under one [`PipelineConfig`]. Each run gets a
//! [`RunContext`] that owns its output directory; nothing is global.
//!
//! ```no_run
//! use std::path::Path;
//! use bimprint_pipeline::{Pipeline, PresetStore, RunContext};
//!
//! let config = PresetStore::new("presets").load("python:default").unwrap();
//! let ctx = RunContext::new("out");
//! let outcome = Pipeline::new(&config, &ctx)
//!     .run(Path::new("building.obj"), None, None)
//!     .unwrap();
//! println!("{}", outcome.report);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;

pub mod config;
pub mod context;
pub mod orchestrator;
pub mod presets;

pub use config::{
    CategoryConfig, ExportConfig, ExtractionSettings, OptimizeConfig, PipelineConfig,
    PrinterSettings,
};
pub use context::RunContext;
pub use error::{PipelineError, PipelineErrorCode, PipelineResult};
pub use orchestrator::{Pipeline, PipelineOutcome, ProcessedMesh, StageRecord};
pub use presets::PresetStore;
