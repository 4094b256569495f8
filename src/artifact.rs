//! Atomic persistence of generated reports.
//!
//! Content is written to a temp file in the destination directory and then
//! renamed onto the final path, so a concurrent reader sees either no file or
//! the complete file. A failed write leaves at most an orphaned `*.tmp`
//! sibling; the final path is never touched.

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::utils::sanitize::slugify;

/// Extension given to every generated report.
pub const ARTIFACT_EXTENSION: &str = "html";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write temporary file in {dir}: {source}")]
    Write {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move report into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<dir>/<slug>_<uuid>.html` for a human-readable query.
pub fn build_artifact_path(query: &str, dir: &Path) -> PathBuf {
    build_artifact_path_with(query, dir, Uuid::new_v4)
}

/// Same as [`build_artifact_path`] with a caller-supplied id generator.
/// Uniqueness of the name rests entirely on the generator.
pub fn build_artifact_path_with<F, I>(query: &str, dir: &Path, id: F) -> PathBuf
where
    F: FnOnce() -> I,
    I: Display,
{
    dir.join(format!("{}_{}.{}", slugify(query), id(), ARTIFACT_EXTENSION))
}

/// Write `content` to `path` so it appears all at once.
pub fn write_atomically(path: &Path, content: &str) -> Result<(), ArtifactError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| ArtifactError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Same directory as the target so the final step is a rename, not a copy.
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{stem}_"))
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|source| ArtifactError::Write {
            dir: dir.clone(),
            source,
        })?;

    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|source| ArtifactError::Write {
            dir: dir.clone(),
            source,
        })?;

    tmp.persist(path).map_err(|e| ArtifactError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "Report written");
    Ok(())
}
