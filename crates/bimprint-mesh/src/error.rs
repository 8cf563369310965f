//! Error types for mesh operations with rich diagnostics.
//!
//! Each error has a code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O errors (reading, writing, parsing, exporting)
//! - `MESH-2xxx`: Validation errors (empty or degenerate input, bad parameters)
//! - `MESH-4xxx`: Unsupported values (file formats, simplification levels)
//!
//! # Example
//!
//! ```rust,ignore
//! use bimprint_mesh::{MeshError, ErrorCode};
//!
//! let err = MeshError::empty_mesh("no faces");
//! assert_eq!(err.code(), ErrorCode::EmptyMesh);
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes for mesh operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-1001: Failed to read file
    IoRead = 1001,
    /// MESH-1002: Failed to write file
    IoWrite = 1002,
    /// MESH-1003: Failed to parse file format
    ParseError = 1003,
    /// MESH-1004: Export produced an empty file
    EmptyExport = 1004,

    /// MESH-2001: Mesh has no vertices or faces
    EmptyMesh = 2001,
    /// MESH-2002: Mesh has zero or non-finite extent
    DegenerateMesh = 2002,
    /// MESH-2003: Operation parameter out of range
    InvalidParameter = 2003,

    /// MESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
    /// MESH-4002: Unknown simplification level
    UnsupportedLevel = 4002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "MESH-1001",
            ErrorCode::IoWrite => "MESH-1002",
            ErrorCode::ParseError => "MESH-1003",
            ErrorCode::EmptyExport => "MESH-1004",
            ErrorCode::EmptyMesh => "MESH-2001",
            ErrorCode::DegenerateMesh => "MESH-2002",
            ErrorCode::InvalidParameter => "MESH-2003",
            ErrorCode::UnsupportedFormat => "MESH-4001",
            ErrorCode::UnsupportedLevel => "MESH-4002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for mesh errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the model from the authoring software.
    ReexportModel { format: Option<String> },
    /// Check the source model for issues.
    CheckSourceModel { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Use a different output format.
    UseDifferentFormat { suggested: Vec<String> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportModel { format } => {
                if let Some(fmt) = format {
                    write!(f, "Try re-exporting the model as {}", fmt)
                } else {
                    write!(f, "Try re-exporting the model from the authoring software")
                }
            }
            RecoverySuggestion::CheckSourceModel { checks } => {
                write!(f, "Check the source model for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Errors that can occur during mesh operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(mesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write mesh to {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing mesh file format.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(mesh::parse::error),
        help("The file may be corrupted or truncated. Try re-exporting it.")
    )]
    ParseError { path: PathBuf, details: String },

    /// The codec wrote nothing.
    #[error("export to {path} produced an empty file")]
    #[diagnostic(
        code(mesh::export::empty),
        help("The mesh may have no faces left after processing. Check the validation report.")
    )]
    EmptyExport { path: PathBuf },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(mesh::format::unsupported),
        help("Supported formats: STL, OBJ (read and write), FBX (write only)")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validation::empty),
        help("The mesh must have at least one vertex and one face. Check the acquisition step.")
    )]
    EmptyMesh { details: String },

    /// Mesh extents make the operation meaningless.
    #[error("degenerate mesh: {details}")]
    #[diagnostic(
        code(mesh::validation::degenerate),
        help("Every bounding box extent must be finite and positive. Flat or collapsed geometry cannot be scaled.")
    )]
    DegenerateMesh { details: String },

    /// A parameter is outside its valid range.
    #[error("invalid parameter {name} = {value}: {details}")]
    #[diagnostic(code(mesh::params::invalid))]
    InvalidParameter {
        name: &'static str,
        value: String,
        details: String,
    },

    /// Unknown named simplification tier.
    #[error("unsupported simplification level: {level:?}")]
    #[diagnostic(
        code(mesh::simplify::level),
        help("Use one of: low, medium, high, or a ratio in (0, 1]")
    )]
    UnsupportedLevel { level: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::EmptyExport { .. } => ErrorCode::EmptyExport,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::DegenerateMesh { .. } => ErrorCode::DegenerateMesh,
            MeshError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            MeshError::UnsupportedLevel { .. } => ErrorCode::UnsupportedLevel,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } | MeshError::IoWrite { .. } => RecoverySuggestion::None,
            MeshError::ParseError { path, .. } => RecoverySuggestion::ReexportModel {
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_uppercase()),
            },
            MeshError::EmptyExport { .. } | MeshError::UnsupportedFormat { .. } => {
                RecoverySuggestion::UseDifferentFormat {
                    suggested: vec!["STL".to_string(), "OBJ".to_string()],
                }
            }
            MeshError::EmptyMesh { .. } => RecoverySuggestion::CheckSourceModel {
                checks: vec![
                    "selected categories contain geometry".to_string(),
                    "elements are not all filtered out".to_string(),
                ],
            },
            MeshError::DegenerateMesh { .. } => RecoverySuggestion::CheckSourceModel {
                checks: vec!["flat or collapsed geometry".to_string()],
            },
            MeshError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![(name.to_string(), "a positive value".to_string())],
            },
            MeshError::UnsupportedLevel { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![(
                    "simplify".to_string(),
                    "low | medium | high | 0.05..=1.0".to_string(),
                )],
            },
        }
    }

    // Constructor helpers

    /// Create an empty mesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create a degenerate mesh error.
    pub fn degenerate_mesh(details: impl Into<String>) -> Self {
        MeshError::DegenerateMesh {
            details: details.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        details: impl Into<String>,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            details: details.into(),
        }
    }

    /// Create an unsupported level error.
    pub fn unsupported_level(level: impl Into<String>) -> Self {
        MeshError::UnsupportedLevel {
            level: level.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an I/O write error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }
}
