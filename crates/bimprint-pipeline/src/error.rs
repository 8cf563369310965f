// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler. This is a false positive in newer Rust versions.
#![allow(unused_assignments)]

//! Error types for pipeline runs.
//!
//! Codes follow the pattern `PIPELINE-XXXX` where:
//! - 1xxx = Configuration and preset errors
//! - 2xxx = Run directory and file system errors
//! - 3xxx = Errors from a stage (mesh, voxel, acquisition)
//!
//! Stage errors keep their own code; [`PipelineError::code`] only tells
//! which crate they came from. Use [`PipelineError::detailed_code`] for the
//! original one.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Machine-readable error codes for pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineErrorCode {
    /// PIPELINE-1001: Invalid configuration
    Config = 1001,
    /// PIPELINE-1002: Preset could not be found
    PresetNotFound = 1002,

    /// PIPELINE-2001: File system error
    Io = 2001,

    /// PIPELINE-3001: Mesh stage failed
    Mesh = 3001,
    /// PIPELINE-3002: Volumetric stage failed
    Voxel = 3002,
    /// PIPELINE-3003: Acquisition failed
    Extract = 3003,
}

impl PipelineErrorCode {
    /// Returns the error code as a string in the format `PIPELINE-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineErrorCode::Config => "PIPELINE-1001",
            PipelineErrorCode::PresetNotFound => "PIPELINE-1002",
            PipelineErrorCode::Io => "PIPELINE-2001",
            PipelineErrorCode::Mesh => "PIPELINE-3001",
            PipelineErrorCode::Voxel => "PIPELINE-3002",
            PipelineErrorCode::Extract => "PIPELINE-3003",
        }
    }
}

impl std::fmt::Display for PipelineErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration missing a key or holding an out-of-range value.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Preset name or path did not resolve to a file.
    #[error("preset not found: {name}")]
    PresetNotFound { name: String, searched: PathBuf },

    /// File system error.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Mesh stage error.
    #[error(transparent)]
    Mesh(#[from] bimprint_mesh::MeshError),

    /// Volumetric stage error.
    #[error(transparent)]
    Voxel(#[from] bimprint_voxel::VoxelError),

    /// Acquisition error.
    #[error(transparent)]
    Extract(#[from] bimprint_extract::ExtractError),
}

// Written by hand rather than derived: the stage errors have an inherent
// `code()` method that shadows `Diagnostic::code` in the derive's
// `transparent` expansion, so delegation goes through the trait explicitly.
impl PipelineError {
    fn inner_diagnostic(&self) -> Option<&dyn Diagnostic> {
        match self {
            PipelineError::Mesh(e) => Some(e),
            PipelineError::Voxel(e) => Some(e),
            PipelineError::Extract(e) => Some(e),
            _ => None,
        }
    }
}

impl Diagnostic for PipelineError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            PipelineError::Config { .. } => Some(Box::new("pipeline::config::invalid")),
            PipelineError::PresetNotFound { .. } => {
                Some(Box::new("pipeline::config::preset_not_found"))
            }
            PipelineError::Io { .. } => Some(Box::new("pipeline::io")),
            _ => self.inner_diagnostic().and_then(Diagnostic::code),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            PipelineError::Config { .. } => Some(Box::new(
                "Compare the configuration with one of the shipped presets",
            )),
            PipelineError::PresetNotFound { .. } => Some(Box::new(
                "Run `bimprint presets` to list the available presets",
            )),
            PipelineError::Io { .. } => None,
            _ => self.inner_diagnostic().and_then(Diagnostic::help),
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        self.inner_diagnostic().and_then(Diagnostic::severity)
    }

    fn url<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.inner_diagnostic().and_then(Diagnostic::url)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.inner_diagnostic().and_then(Diagnostic::source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.inner_diagnostic().and_then(Diagnostic::labels)
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        self.inner_diagnostic().and_then(Diagnostic::related)
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.inner_diagnostic().and_then(Diagnostic::diagnostic_source)
    }
}

impl PipelineError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> PipelineErrorCode {
        match self {
            PipelineError::Config { .. } => PipelineErrorCode::Config,
            PipelineError::PresetNotFound { .. } => PipelineErrorCode::PresetNotFound,
            PipelineError::Io { .. } => PipelineErrorCode::Io,
            PipelineError::Mesh(_) => PipelineErrorCode::Mesh,
            PipelineError::Voxel(_) => PipelineErrorCode::Voxel,
            PipelineError::Extract(_) => PipelineErrorCode::Extract,
        }
    }

    /// The most specific code available, e.g. `VOXEL-2001`.
    pub fn detailed_code(&self) -> &'static str {
        match self {
            PipelineError::Mesh(e) => e.code().as_str(),
            PipelineError::Voxel(e) => e.code().as_str(),
            PipelineError::Extract(e) => e.code().as_str(),
            other => other.code().as_str(),
        }
    }

    /// Human-readable recovery suggestion.
    pub fn recovery_suggestion(&self) -> String {
        match self {
            PipelineError::Config { .. } => {
                "Fix the configuration value named above and run again".to_string()
            }
            PipelineError::PresetNotFound { searched, .. } => {
                format!("Check {} for available presets", searched.display())
            }
            PipelineError::Io { .. } => {
                "Check that the output directory exists and is writable".to_string()
            }
            PipelineError::Mesh(e) => e.recovery_suggestion().to_string(),
            PipelineError::Voxel(e) => e.recovery_suggestion().to_string(),
            PipelineError::Extract(e) => e.recovery_suggestion().to_string(),
        }
    }

    // Constructor helpers

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}
