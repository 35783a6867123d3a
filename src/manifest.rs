//! Build-target manifest rewriting
//!
//! Loads the manifest JSON, retargets `AdditionalProperties[*].Value` and
//! writes the document back only when at least one value changed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::retarget::{retarget, RetargetOptions};

/// Top-level list holding path-bearing key/value records
pub const ADDITIONAL_PROPERTIES: &str = "AdditionalProperties";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// An absolute path that was left untouched because no anchor matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPath {
    pub key: Option<String>,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for UnresolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{key}: {} -> {}", self.value, self.reason),
            None => write!(f, "{} -> {}", self.value, self.reason),
        }
    }
}

/// Summary of a single `rewrite_manifest` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub changed: usize,
    pub notes: Vec<UnresolvedPath>,
    pub written: bool,
}

/// Retarget every path value in the manifest at `path`.
///
/// The file is rewritten atomically (temp file + rename in the same
/// directory) when at least one value changed; otherwise it is not touched.
pub fn rewrite_manifest(path: &Path, options: &RetargetOptions) -> Result<RewriteReport> {
    if !path.is_file() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut document: Value =
        serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let Some(entries) = document
        .get_mut(ADDITIONAL_PROPERTIES)
        .and_then(Value::as_array_mut)
    else {
        tracing::info!(
            "No {} array in {}; nothing to change",
            ADDITIONAL_PROPERTIES,
            path.display()
        );
        return Ok(RewriteReport::default());
    };

    let mut report = retarget_entries(entries, options);

    if report.changed > 0 {
        let bytes = to_manifest_bytes(&document).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &bytes).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        report.written = true;
        tracing::info!(
            "Updated {} entries in {} of {}",
            report.changed,
            ADDITIONAL_PROPERTIES,
            path.display()
        );
    } else {
        tracing::info!("No absolute paths in {} required changes", path.display());
    }

    for note in &report.notes {
        tracing::warn!("Unresolved path {}", note);
    }

    Ok(report)
}

fn retarget_entries(entries: &mut [Value], options: &RetargetOptions) -> RewriteReport {
    let mut report = RewriteReport::default();

    for entry in entries.iter_mut() {
        let Some(record) = entry.as_object_mut() else {
            continue;
        };
        let key = record.get("Key").and_then(Value::as_str).map(str::to_string);
        let Some(Value::String(value)) = record.get_mut("Value") else {
            continue;
        };

        let result = retarget(value, options);
        if let Some(reason) = result.note {
            report.notes.push(UnresolvedPath {
                key,
                value: value.clone(),
                reason: reason.to_string(),
            });
        }
        if result.changed {
            tracing::debug!("Retargeted {} -> {}", value, result.value);
            *value = result.value;
            report.changed += 1;
        }
    }

    report
}

/// One-space indent, UTF-8 kept verbatim, single trailing newline
fn to_manifest_bytes(document: &Value) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut ser).map_err(io::Error::from)?;
    buf.push(b'\n');
    Ok(buf)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
