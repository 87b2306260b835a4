//! Upload staging
//!
//! Every file a specialist may read lives in the upload directory under a
//! unique `<uuid>_<name>` path and is removed when its `StagedFile` drops.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Keeps the extension so the file reader can detect the format.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A file in the upload directory, removed when dropped
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    fn target(dir: &Path, original_name: &str) -> PathBuf {
        dir.join(format!(
            "{}_{}",
            uuid::Uuid::new_v4(),
            sanitize_file_name(original_name)
        ))
    }

    /// Stage uploaded bytes
    pub async fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = Self::target(dir, original_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(Self { path })
    }

    /// Stage a copy of a file that lives elsewhere on disk
    pub async fn copy_from(dir: &Path, source: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let path = Self::target(dir, name);
        tokio::fs::copy(source, &path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove staged upload");
        }
    }
}
