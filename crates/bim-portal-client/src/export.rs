//! Saving exported artifacts to disk.

use crate::models::{AiaResource, ExportFormat};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export content is empty")]
    EmptyContent,

    #[error("Invalid export filename: {0}")]
    InvalidFilename(String),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Default filename for an export, e.g. `project_<guid>.pdf`.
#[must_use]
pub fn export_filename(kind: AiaResource, guid: Uuid, format: ExportFormat) -> String {
    format!("{}_{guid}.{}", kind.label(), format.file_extension())
}

/// Writes export payloads into one directory.
#[derive(Debug, Clone)]
pub struct ExportWriter {
    directory: PathBuf,
}

impl ExportWriter {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `content` to `<directory>/<filename>`, creating the directory
    /// if needed. An existing file is overwritten.
    ///
    /// # Errors
    ///
    /// - `EmptyContent` - nothing to write
    /// - `InvalidFilename` - empty, or not a single plain path component
    /// - `Io` - directory creation or write failed
    pub async fn save(&self, content: &[u8], filename: &str) -> Result<PathBuf, ExportError> {
        if content.is_empty() {
            return Err(ExportError::EmptyContent);
        }
        validate_filename(filename)?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(filename);
        tokio::fs::write(&path, content).await?;

        info!(
            target: "bim.export",
            path = %path.display(),
            bytes = content.len(),
            "Export saved"
        );
        Ok(path)
    }
}

fn validate_filename(filename: &str) -> Result<(), ExportError> {
    if filename.trim().is_empty() {
        return Err(ExportError::InvalidFilename("filename is empty".to_string()));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !filename.contains('\\') => Ok(()),
        _ => Err(ExportError::InvalidFilename(format!(
            "'{filename}' must be a plain file name"
        ))),
    }
}
