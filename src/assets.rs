//! Binary asset storage

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io,
};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to an uploaded file owned by exactly one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<String> for AssetHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<AssetHandle> for String {
    fn from(value: AssetHandle) -> Self {
        value.0
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset handle `{0}` is not valid for this store")]
    InvalidHandle(String),

    #[error("asset I/O failed")]
    Io(#[from] io::Error),

    #[error("asset backend failure")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

/// Durable storage for uploaded files.
#[automock]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist `bytes` and return a handle to them.
    async fn store(&self, bytes: Vec<u8>, extension: &str) -> Result<AssetHandle, AssetError>;

    /// Remove the file behind `handle`. Removing an already absent file succeeds.
    async fn delete(&self, handle: &AssetHandle) -> Result<(), AssetError>;
}
