use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_reference, AssetError, AssetStore};

#[derive(Default)]
pub struct MemoryAssetStore {
    photos: Mutex<HashMap<String, Vec<u8>>>,
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    fail_photo_loads: AtomicBool,
    photo_loads: AtomicUsize,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_photo(&self, photo_ref: &str, bytes: Vec<u8>) {
        self.photos
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(photo_ref.to_string(), bytes);
    }

    /// Makes every photo load fail with an I/O error
    pub fn set_fail_photo_loads(&self, fail: bool) {
        self.fail_photo_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of `load_photo` calls so far
    pub fn photo_loads(&self) -> usize {
        self.photo_loads.load(Ordering::SeqCst)
    }

    pub fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn load_photo(&self, photo_ref: &str) -> Result<Option<Vec<u8>>, AssetError> {
        self.photo_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_photo_loads.load(Ordering::SeqCst) {
            return Err(AssetError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "photo volume offline",
            )));
        }
        let name = validate_reference(photo_ref)?;
        Ok(self
            .photos
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned())
    }

    async fn store_artifact(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<String, AssetError> {
        let name = validate_reference(suggested_name)?;
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), bytes.to_vec());
        Ok(name.to_string())
    }

    async fn load_artifact(&self, artifact_ref: &str) -> Result<Option<Vec<u8>>, AssetError> {
        let name = validate_reference(artifact_ref)?;
        Ok(self
            .artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned())
    }

    async fn discard_artifact(&self, artifact_ref: &str) -> Result<(), AssetError> {
        let name = validate_reference(artifact_ref)?;
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        Ok(())
    }
}
