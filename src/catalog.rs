//! Catalog Records
//!
//! Categories, pujas, blogs, rudraksha, bracelets and puja bookings share one shape as
//! far as the lifecycle is concerned: an id, ordered images, and opaque details.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    assets::AssetHandle,
    ids::RecordUuid,
    kinds::EntityKind,
    lifecycle::{Lifecycle, LifecycleState, LifecycleStore, StoreError, Trashable, WriteError},
};

/// Catalog Record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub uuid: RecordUuid,
    pub kind: EntityKind,
    /// Kind-specific fields, opaque to the lifecycle.
    pub details: serde_json::Value,
    /// Image handles in display order.
    pub assets: Vec<AssetHandle>,
    pub lifecycle: Lifecycle,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// New Catalog Record
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogRecord {
    pub uuid: RecordUuid,
    pub details: serde_json::Value,
    pub assets: Vec<AssetHandle>,
}

/// Result of replacing a record's asset list.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetChange {
    /// The record as written.
    pub record: CatalogRecord,

    /// Handles that were attached before and are no longer referenced.
    pub detached: Vec<AssetHandle>,
}

impl Trashable for CatalogRecord {
    type Id = RecordUuid;

    fn id(&self) -> RecordUuid {
        self.uuid
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn assets(&self) -> &[AssetHandle] {
        &self.assets
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle, updated_at: Timestamp) {
        self.lifecycle = lifecycle;
        self.updated_at = updated_at;
    }
}

/// Storage for catalog records of a single kind.
#[async_trait]
pub trait CatalogStore: LifecycleStore<Entity = CatalogRecord> {
    /// Insert a new, active record.
    async fn create(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError>;

    /// Replace the ordered asset list of an active record.
    ///
    /// Order of `assets` is kept as given. Detached handles are returned, not deleted;
    /// [`EntityLifecycleManager::replace_assets`] releases them once the write commits.
    ///
    /// [`EntityLifecycleManager::replace_assets`]: crate::lifecycle::EntityLifecycleManager::replace_assets
    async fn replace_assets(
        &self,
        uuid: RecordUuid,
        assets: Vec<AssetHandle>,
    ) -> Result<AssetChange, WriteError<LifecycleState>>;
}

/// Handles in `before` that do not appear in `after`, in their original order.
#[must_use]
pub fn detached_assets(before: &[AssetHandle], after: &[AssetHandle]) -> Vec<AssetHandle> {
    before
        .iter()
        .filter(|handle| !after.contains(handle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_assets_keeps_original_order() {
        let before = ["a", "b", "c", "d"].map(AssetHandle::new);
        let after = ["d", "b"].map(AssetHandle::new);

        assert_eq!(
            detached_assets(&before, &after),
            vec![AssetHandle::new("a"), AssetHandle::new("c")]
        );
    }
}
