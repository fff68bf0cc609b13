//! Filesystem asset store

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use sanctum::assets::{AssetError, AssetHandle, AssetStore};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Stores uploads as flat files under a root directory.
///
/// Handles are paths relative to the root, so the directory can move without
/// rewriting stored records.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, handle: &AssetHandle) -> Result<PathBuf, AssetError> {
        let relative = Path::new(handle.as_str());

        let contained = !handle.as_str().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !contained {
            return Err(AssetError::InvalidHandle(handle.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store(&self, bytes: Vec<u8>, extension: &str) -> Result<AssetHandle, AssetError> {
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AssetError::InvalidHandle(format!("*.{extension}")));
        }

        let handle = AssetHandle::new(format!("{}.{extension}", Uuid::now_v7().simple()));

        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(handle.as_str()), bytes).await?;

        debug!(%handle, "stored asset");

        Ok(handle)
    }

    async fn delete(&self, handle: &AssetHandle) -> Result<(), AssetError> {
        let path = self.resolve(handle)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%handle, "deleted asset");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AssetError::Io(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[tokio::test]
    async fn stores_and_deletes_files_under_root() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsAssetStore::new(dir.path().join("uploads"));

        let handle = store.store(b"om".to_vec(), "jpg").await?;
        let path = store.root().join(handle.as_str());

        assert!(handle.as_str().ends_with(".jpg"));
        assert_eq!(fs::read(&path).await?, b"om");

        store.delete(&handle).await?;

        assert!(!path.exists(), "file survived delete");

        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_missing_file_succeeds() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsAssetStore::new(dir.path());

        store.delete(&AssetHandle::new("gone.png")).await?;

        Ok(())
    }

    #[tokio::test]
    async fn handles_outside_the_root_are_rejected() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsAssetStore::new(dir.path().join("uploads"));

        for handle in ["../secret.txt", "/etc/passwd", "a/../../b.png", ""] {
            let result = store.delete(&AssetHandle::new(handle)).await;

            assert!(
                matches!(result, Err(AssetError::InvalidHandle(_))),
                "{handle:?} was accepted: {result:?}"
            );
        }

        Ok(())
    }

    #[tokio::test]
    async fn extensions_must_be_plain() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = FsAssetStore::new(dir.path());

        let result = store.store(b"x".to_vec(), "png/../../x").await;

        assert!(matches!(result, Err(AssetError::InvalidHandle(_))));

        Ok(())
    }
}
