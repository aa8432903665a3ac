//! Artifact output and input staging directories.

use std::path::{Path, PathBuf};

use batchgen_core::naming::staged_upload_filename;
use batchgen_core::request::validate_file_name;
use batchgen_core::types::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Writes generated artifacts and reads staged inputs.
///
/// All names are bare file names; anything with a path component is
/// rejected before touching the filesystem.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    staging_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Create both directories if missing.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.output_dir, &self.staging_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StorageError::io(dir, e))?;
        }
        Ok(())
    }

    /// Read a staged input. `Ok(None)` when no such file exists.
    pub async fn read_staged(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.staging_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Write one artifact under the output root and return its path.
    pub async fn save_artifact(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        validate_file_name(filename).map_err(|_| StorageError::InvalidName(filename.to_string()))?;
        let path = self.output_dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(path)
    }

    /// Store an uploaded input under a timestamp-based name and return
    /// that name.
    pub async fn stage_upload(
        &self,
        original_name: &str,
        bytes: &[u8],
        now: Timestamp,
    ) -> Result<String, StorageError> {
        let filename = staged_upload_filename(now, original_name);
        let path = self.staging_path(&filename)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(filename)
    }

    fn staging_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(name).map_err(|_| StorageError::InvalidName(name.to_string()))?;
        Ok(self.staging_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn store(dir: &tempfile::TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path().join("out"), dir.path().join("staging"))
    }

    #[tokio::test]
    async fn staged_upload_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let now = chrono::Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let name = store.stage_upload("cat.PNG", b"bytes", now).await.unwrap();

        assert_eq!(name, "1700000000000.png");
        assert_eq!(store.read_staged(&name).await.unwrap().unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn missing_staged_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();
        assert!(store.read_staged("nope.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_matches!(
            store.read_staged("../tasks.db").await,
            Err(StorageError::InvalidName(_))
        );
        assert_matches!(
            store.save_artifact("a/b.png", b"x").await,
            Err(StorageError::InvalidName(_))
        );
    }

    #[tokio::test]
    async fn artifact_lands_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let path = store.save_artifact("t_a_01.png", b"img").await.unwrap();
        assert_eq!(path, dir.path().join("out").join("t_a_01.png"));
        assert_eq!(std::fs::read(path).unwrap(), b"img");
    }
}
