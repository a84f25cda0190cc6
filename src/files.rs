//! Local storage for raw uploads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by file storage.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Filesystem operation failed.
    #[error("File storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Supplied name has no usable file component.
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
}

/// Stores uploads under `<root>/<project_id>/<uuid>_<name>`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` and return the locally readable path.
    pub async fn save(
        &self,
        project_id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, FileStoreError> {
        let safe_name = sanitize_file_name(file_name)
            .ok_or_else(|| FileStoreError::InvalidName(file_name.to_string()))?;
        let directory = self.root.join(project_id.to_string());
        tokio::fs::create_dir_all(&directory).await?;

        let path = directory.join(format!("{}_{safe_name}", Uuid::new_v4().simple()));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Upload stored");
        Ok(path)
    }

    /// Remove a stored file. Missing files are ignored.
    pub async fn delete(&self, path: &Path) -> Result<(), FileStoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Upload already removed");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Keep only the final path component and replace characters outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(
        base.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(
            sanitize_file_name("../../etc/pass wd.pdf").as_deref(),
            Some("pass_wd.pdf")
        );
        assert_eq!(sanitize_file_name("C:\\docs\\a.pdf").as_deref(), Some("a.pdf"));
        assert!(sanitize_file_name("dir/").is_none());
        assert!(sanitize_file_name("..").is_none());
    }

    #[tokio::test]
    async fn save_then_delete_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let project_id = Uuid::new_v4();

        let path = store
            .save(project_id, "notes.pdf", b"%PDF-1.5")
            .await
            .expect("save");
        assert!(path.starts_with(dir.path().join(project_id.to_string())));
        assert!(path.to_string_lossy().ends_with("_notes.pdf"));
        assert_eq!(tokio::fs::read(&path).await.expect("read"), b"%PDF-1.5");

        store.delete(&path).await.expect("delete");
        store.delete(&path).await.expect("idempotent delete");
        assert!(!path.exists());
    }
}
