// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler. This is a false positive in newer Rust versions.
#![allow(unused_assignments)]

//! Error types for geometry acquisition.
//!
//! Codes follow the pattern `EXTRACT-XXXX` where:
//! - 1xxx = In-process collection errors
//! - 2xxx = Extractor selection errors (schema, executable lookup)
//! - 3xxx = Extractor process errors
//! - 4xxx = Extractor output errors
//! - 5xxx = Errors from the underlying mesh operations and I/O

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for acquisition.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Machine-readable error codes for acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractErrorCode {
    /// EXTRACT-1001: No element produced any geometry
    NoGeometryExtracted = 1001,

    /// EXTRACT-2001: Model schema could not be determined
    SchemaDetection = 2001,
    /// EXTRACT-2002: No extractor executable found
    ExtractorNotFound = 2002,

    /// EXTRACT-3001: Extractor exited with an error
    ExtractorFailed = 3001,
    /// EXTRACT-3002: Extractor exceeded its time limit
    ExtractorTimeout = 3002,

    /// EXTRACT-4001: Extractor wrote no mesh
    OutputNotFound = 4001,
    /// EXTRACT-4002: Extractor mesh failed the sanity check
    InvalidExtractorOutput = 4002,

    /// EXTRACT-5001: Mesh operation failed
    MeshOperation = 5001,
    /// EXTRACT-5002: File system error
    Io = 5002,
}

impl ExtractErrorCode {
    /// Returns the error code as a string in the format `EXTRACT-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractErrorCode::NoGeometryExtracted => "EXTRACT-1001",
            ExtractErrorCode::SchemaDetection => "EXTRACT-2001",
            ExtractErrorCode::ExtractorNotFound => "EXTRACT-2002",
            ExtractErrorCode::ExtractorFailed => "EXTRACT-3001",
            ExtractErrorCode::ExtractorTimeout => "EXTRACT-3002",
            ExtractErrorCode::OutputNotFound => "EXTRACT-4001",
            ExtractErrorCode::InvalidExtractorOutput => "EXTRACT-4002",
            ExtractErrorCode::MeshOperation => "EXTRACT-5001",
            ExtractErrorCode::Io => "EXTRACT-5002",
        }
    }
}

impl std::fmt::Display for ExtractErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for acquisition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractRecoverySuggestion {
    /// Widen the category whitelist.
    CheckCategories { include: Vec<String> },
    /// Point the configuration at a different extractor.
    ConfigureExtractor,
    /// Allow the extractor more time.
    RaiseTimeout { current_secs: u64 },
    /// Look at the extractor's own output.
    InspectExtractorLog,
    /// Fall back to in-process extraction.
    UseInProcessPath,
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for ExtractRecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractRecoverySuggestion::CheckCategories { include } => {
                if include.is_empty() {
                    write!(f, "Add element categories to categories.include")
                } else {
                    write!(
                        f,
                        "Check that the model contains any of: {}",
                        include.join(", ")
                    )
                }
            }
            ExtractRecoverySuggestion::ConfigureExtractor => {
                write!(
                    f,
                    "Set tudelft_extractor.path to an executable or a directory of per-schema executables"
                )
            }
            ExtractRecoverySuggestion::RaiseTimeout { current_secs } => {
                write!(f, "Raise tudelft_extractor.timeout_secs above {}", current_secs)
            }
            ExtractRecoverySuggestion::InspectExtractorLog => {
                write!(f, "Inspect the extractor output logged above")
            }
            ExtractRecoverySuggestion::UseInProcessPath => {
                write!(
                    f,
                    "Remove tudelft_extractor from the configuration to extract in-process"
                )
            }
            ExtractRecoverySuggestion::None => {
                write!(f, "No specific suggestion available")
            }
        }
    }
}

/// Errors that can occur while acquiring raw geometry.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    /// Every element failed or nothing matched the categories.
    #[error("no geometry could be extracted for categories {include:?}")]
    #[diagnostic(
        code(extract::collect::no_geometry),
        help("Check the category whitelist against the element types in the model")
    )]
    NoGeometryExtracted { include: Vec<String> },

    /// No `FILE_SCHEMA` declaration in the model header.
    #[error("unsupported or unknown IFC schema in {path}")]
    #[diagnostic(
        code(extract::schema::unknown),
        help("Only IFC2X3, IFC4 and IFC4X3 headers are recognised")
    )]
    SchemaDetection { path: PathBuf },

    /// Extractor path missing or no executable matches the schema.
    #[error("extractor not found at {path}: {details}")]
    #[diagnostic(code(extract::runner::not_found))]
    ExtractorNotFound { path: PathBuf, details: String },

    /// Extractor exited non-zero.
    #[error("extractor failed with code {code}: {stderr}")]
    #[diagnostic(code(extract::runner::failed))]
    ExtractorFailed { code: i32, stderr: String },

    /// Extractor ran past its timeout and was killed.
    #[error("extractor timed out after {}s", timeout.as_secs())]
    #[diagnostic(code(extract::runner::timeout))]
    ExtractorTimeout { timeout: Duration },

    /// No output mesh below the output directory.
    #[error("no .{extension} output found under {dir}")]
    #[diagnostic(code(extract::output::not_found))]
    OutputNotFound { dir: PathBuf, extension: String },

    /// Output mesh is empty or implausible.
    #[error("invalid extractor output {path}: {reason}")]
    #[diagnostic(code(extract::output::invalid))]
    InvalidExtractorOutput { path: PathBuf, reason: String },

    /// Underlying mesh error.
    #[error("mesh operation failed: {0}")]
    #[diagnostic(code(extract::mesh::error))]
    Mesh(#[from] bimprint_mesh::MeshError),

    /// File system or process spawn error.
    #[error("{context}: {source}")]
    #[diagnostic(code(extract::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ExtractErrorCode {
        match self {
            ExtractError::NoGeometryExtracted { .. } => ExtractErrorCode::NoGeometryExtracted,
            ExtractError::SchemaDetection { .. } => ExtractErrorCode::SchemaDetection,
            ExtractError::ExtractorNotFound { .. } => ExtractErrorCode::ExtractorNotFound,
            ExtractError::ExtractorFailed { .. } => ExtractErrorCode::ExtractorFailed,
            ExtractError::ExtractorTimeout { .. } => ExtractErrorCode::ExtractorTimeout,
            ExtractError::OutputNotFound { .. } => ExtractErrorCode::OutputNotFound,
            ExtractError::InvalidExtractorOutput { .. } => {
                ExtractErrorCode::InvalidExtractorOutput
            }
            ExtractError::Mesh(_) => ExtractErrorCode::MeshOperation,
            ExtractError::Io { .. } => ExtractErrorCode::Io,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> ExtractRecoverySuggestion {
        match self {
            ExtractError::NoGeometryExtracted { include } => {
                ExtractRecoverySuggestion::CheckCategories {
                    include: include.clone(),
                }
            }
            ExtractError::SchemaDetection { .. } | ExtractError::ExtractorNotFound { .. } => {
                ExtractRecoverySuggestion::ConfigureExtractor
            }
            ExtractError::ExtractorTimeout { timeout } => ExtractRecoverySuggestion::RaiseTimeout {
                current_secs: timeout.as_secs(),
            },
            ExtractError::ExtractorFailed { .. } => ExtractRecoverySuggestion::InspectExtractorLog,
            ExtractError::OutputNotFound { .. } | ExtractError::InvalidExtractorOutput { .. } => {
                ExtractRecoverySuggestion::UseInProcessPath
            }
            ExtractError::Mesh(_) | ExtractError::Io { .. } => ExtractRecoverySuggestion::None,
        }
    }

    // Constructor helpers

    /// Create an extractor not found error.
    pub fn extractor_not_found(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        ExtractError::ExtractorNotFound {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an invalid output error.
    pub fn invalid_output(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExtractError::InvalidExtractorOutput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ExtractError::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ExtractError::ExtractorFailed {
            code: 3,
            stderr: "boom".to_string(),
        };
        assert_eq!(err.code(), ExtractErrorCode::ExtractorFailed);
        assert_eq!(err.code().as_str(), "EXTRACT-3001");
        assert_eq!(format!("{}", err), "extractor failed with code 3: boom");
    }

    #[test]
    fn test_timeout_suggestion() {
        let err = ExtractError::ExtractorTimeout {
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            err.recovery_suggestion(),
            ExtractRecoverySuggestion::RaiseTimeout { current_secs: 60 }
        );
        assert!(format!("{}", err).contains("60s"));
    }

    #[test]
    fn test_no_geometry_suggestion_lists_categories() {
        let err = ExtractError::NoGeometryExtracted {
            include: vec!["IfcWall".to_string()],
        };
        assert_eq!(err.code().as_str(), "EXTRACT-1001");
        assert!(err.recovery_suggestion().to_string().contains("IfcWall"));
    }

    #[test]
    fn test_from_mesh_error() {
        let err: ExtractError = bimprint_mesh::MeshError::empty_mesh("test").into();
        assert!(matches!(err, ExtractError::Mesh(_)));
        assert_eq!(err.code().as_str(), "EXTRACT-5001");
    }
}
