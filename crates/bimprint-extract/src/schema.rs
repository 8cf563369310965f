//! Model schema detection and per-schema extractor selection.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExtractError, ExtractResult};

/// Header lines inspected for a `FILE_SCHEMA` declaration.
pub const SCHEMA_SCAN_LINES: usize = 50;

/// Declared version of the model file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    Ifc2x3,
    Ifc4,
    Ifc4x3,
}

impl SchemaVersion {
    /// Lower-case token searched for in executable names.
    pub fn token(self) -> &'static str {
        match self {
            SchemaVersion::Ifc2x3 => "ifc2x3",
            SchemaVersion::Ifc4 => "ifc4",
            SchemaVersion::Ifc4x3 => "ifc4x3",
        }
    }

    /// Whether an executable file name is meant for this schema.
    pub fn matches_file_name(self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        match self {
            // "ifc4" is a prefix of "ifc4x3"
            SchemaVersion::Ifc4 => lower.contains("ifc4") && !lower.contains("ifc4x3"),
            other => lower.contains(other.token()),
        }
    }

    /// Classify one header line, most specific schema first.
    fn from_header_line(line: &str) -> Option<Self> {
        let upper = line.to_ascii_uppercase();
        if !upper.contains("FILE_SCHEMA") {
            return None;
        }
        [SchemaVersion::Ifc2x3, SchemaVersion::Ifc4x3, SchemaVersion::Ifc4]
            .into_iter()
            .find(|schema| upper.contains(&schema.token().to_ascii_uppercase()))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token().to_ascii_uppercase())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ifc2x3" => Ok(SchemaVersion::Ifc2x3),
            "ifc4" => Ok(SchemaVersion::Ifc4),
            "ifc4x3" => Ok(SchemaVersion::Ifc4x3),
            other => Err(format!("unknown schema {other:?}")),
        }
    }
}

/// Read the schema from the first [`SCHEMA_SCAN_LINES`] lines of `path`.
///
/// # Errors
///
/// - [`ExtractError::Io`] when the file cannot be read.
/// - [`ExtractError::SchemaDetection`] when no known schema is declared.
pub fn detect_schema(path: &Path) -> ExtractResult<SchemaVersion> {
    let file = File::open(path)
        .map_err(|e| ExtractError::io(format!("failed to open {}", path.display()), e))?;

    // Header lines are ASCII but the body may not be; read raw bytes
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    for _ in 0..SCHEMA_SCAN_LINES {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| ExtractError::io(format!("failed to read {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(schema) = SchemaVersion::from_header_line(&line) {
            info!(%schema, path = %path.display(), "Detected model schema");
            return Ok(schema);
        }
    }

    Err(ExtractError::SchemaDetection {
        path: path.to_path_buf(),
    })
}

/// Pick the executable for `schema` from `dir`.
///
/// Candidates are regular files whose lower-cased name matches the schema
/// token; the lexicographically first name wins.
///
/// # Errors
///
/// [`ExtractError::ExtractorNotFound`] when the directory cannot be listed
/// or nothing matches.
pub fn select_extractor(dir: &Path, schema: SchemaVersion) -> ExtractResult<PathBuf> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ExtractError::extractor_not_found(dir, e.to_string()))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| schema.matches_file_name(n))
        })
        .collect();
    candidates.sort();

    debug!(%schema, candidates = candidates.len(), dir = %dir.display(), "Extractor candidates");

    candidates.into_iter().next().ok_or_else(|| {
        ExtractError::extractor_not_found(dir, format!("no executable for schema {schema}"))
    })
}
