// Assets module - Photo loading and card artifact storage

use async_trait::async_trait;

pub mod fs;
pub mod memory;

pub use fs::FsAssetStore;
pub use memory::MemoryAssetStore;

#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid asset reference: {0}")]
    InvalidReference(String),
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// `Ok(None)` when no photo exists under `photo_ref`
    async fn load_photo(&self, photo_ref: &str) -> Result<Option<Vec<u8>>, AssetError>;

    /// Stores `bytes` under `suggested_name`, replacing any previous artifact
    /// atomically, and returns the reference to record on the card
    async fn store_artifact(&self, bytes: &[u8], suggested_name: &str)
        -> Result<String, AssetError>;

    async fn load_artifact(&self, artifact_ref: &str) -> Result<Option<Vec<u8>>, AssetError>;

    /// Removes an artifact; missing artifacts are not an error
    async fn discard_artifact(&self, artifact_ref: &str) -> Result<(), AssetError>;
}

/// Accepts plain file names only, so references cannot escape their directory
pub(crate) fn validate_reference(reference: &str) -> Result<&str, AssetError> {
    let trimmed = reference.trim();
    let valid = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\', '\0']);

    if valid {
        Ok(trimmed)
    } else {
        Err(AssetError::InvalidReference(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reference() {
        assert_eq!(validate_reference(" photo.jpg ").unwrap(), "photo.jpg");
        assert!(validate_reference("../etc/passwd").is_err());
        assert!(validate_reference("a\\b.png").is_err());
        assert!(validate_reference("..").is_err());
        assert!(validate_reference("").is_err());
    }
}
