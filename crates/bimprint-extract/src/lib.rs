//! Raw geometry acquisition for building models.
//!
//! This crate turns a building model file into one combined triangle mesh,
//! either in-process through a [`GeometryKernel`] or by running an external
//! envelope extractor and loading what it writes.
//!
//! # In-process
//!
//! ```no_run
//! use std::path::Path;
//! use bimprint_extract::{AcquisitionAdapter, ExtractionConfig, ObjSceneKernel};
//!
//! let mut adapter =
//!     AcquisitionAdapter::new(ObjSceneKernel, ExtractionConfig::default(), "work");
//! let raw = adapter.acquire(Path::new("building.obj")).unwrap();
//! ```
//!
//! # External extractor
//!
//! Set [`ExtractionConfig::external`]. A configured directory is searched for
//! the executable matching the model's `FILE_SCHEMA`; see [`detect_schema`]
//! and [`select_extractor`].

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;

pub mod adapter;
pub mod category;
pub mod config;
pub mod kernel;
pub mod runner;
pub mod schema;

pub use adapter::AcquisitionAdapter;
pub use category::{CATEGORY_MAP, DEFAULT_CATEGORIES, normalize_categories, resolve_types};
pub use config::{ExternalExtractorConfig, ExtractionConfig, ExtractorTolerances};
pub use error::{ExtractError, ExtractErrorCode, ExtractRecoverySuggestion, ExtractResult};
pub use kernel::{ElementId, GeometryKernel, ObjScene, ObjSceneKernel, RawGeometry};
pub use runner::{ExtractorRunner, discover_output, sanity_check};
pub use schema::{SchemaVersion, detect_schema, select_extractor};
