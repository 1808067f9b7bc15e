use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{validate_reference, AssetError, AssetStore};

const PHOTO_DIR: &str = "photos";
const ARTIFACT_DIR: &str = "idcards";

/// Filesystem layout under the upload directory:
/// `<root>/photos/<photo_ref>` and `<root>/idcards/<artifact_ref>`
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    photo_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl FsAssetStore {
    pub fn new(upload_dir: impl AsRef<Path>) -> Self {
        let root = upload_dir.as_ref();
        Self {
            photo_dir: root.join(PHOTO_DIR),
            artifact_dir: root.join(ARTIFACT_DIR),
        }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, AssetError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn load_photo(&self, photo_ref: &str) -> Result<Option<Vec<u8>>, AssetError> {
        let name = validate_reference(photo_ref)?;
        read_optional(&self.photo_dir.join(name)).await
    }

    async fn store_artifact(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<String, AssetError> {
        let name = validate_reference(suggested_name)?;
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        // Write beside the target then rename over it; rename within a directory is atomic
        let final_path = self.artifact_dir.join(name);
        let temp_path = self
            .artifact_dir
            .join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(path = %final_path.display(), size = bytes.len(), "Artifact stored");

        Ok(name.to_string())
    }

    async fn load_artifact(&self, artifact_ref: &str) -> Result<Option<Vec<u8>>, AssetError> {
        let name = validate_reference(artifact_ref)?;
        read_optional(&self.artifact_dir.join(name)).await
    }

    async fn discard_artifact(&self, artifact_ref: &str) -> Result<(), AssetError> {
        let name = validate_reference(artifact_ref)?;
        match tokio::fs::remove_file(self.artifact_dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_replace_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let reference = store
            .store_artifact(b"first", "idcard_FAMTNCH0001.png")
            .await
            .unwrap();
        assert_eq!(reference, "idcard_FAMTNCH0001.png");

        store
            .store_artifact(b"second", "idcard_FAMTNCH0001.png")
            .await
            .unwrap();

        let loaded = store.load_artifact(&reference).await.unwrap();
        assert_eq!(loaded.as_deref(), Some(&b"second"[..]));

        // No temporary files are left behind
        let entries: Vec<_> = std::fs::read_dir(store.artifact_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_photo_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        assert!(store.load_photo("nobody.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_photo_from_photo_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());
        std::fs::create_dir_all(store.photo_dir()).unwrap();
        std::fs::write(store.photo_dir().join("p.jpg"), b"jpeg").unwrap();

        let photo = store.load_photo("p.jpg").await.unwrap();
        assert_eq!(photo.as_deref(), Some(&b"jpeg"[..]));
    }

    #[tokio::test]
    async fn test_rejects_escaping_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let result = store.load_photo("../secret").await;
        assert!(matches!(result, Err(AssetError::InvalidReference(_))));
    }

    #[tokio::test]
    async fn test_discard_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path());

        let reference = store.store_artifact(b"x", "a.pdf").await.unwrap();
        store.discard_artifact(&reference).await.unwrap();
        store.discard_artifact(&reference).await.unwrap();

        assert!(store.load_artifact(&reference).await.unwrap().is_none());
    }
}
