//! Bookable item resolution
//!
//! An [`ItemRef`] is resolved through a fixed table from [`ItemKind`] to the store that
//! holds items of that kind.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use mockall::automock;

use crate::{
    booking::ItemRef,
    catalog::CatalogRecord,
    ids::RecordUuid,
    kinds::ItemKind,
    lifecycle::{LifecycleStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAvailability {
    Missing,
    Trashed,
    Active,
}

/// Existence and lifecycle check for one kind of purchasable item.
#[automock]
#[async_trait]
pub trait ItemLookup: Send + Sync {
    async fn availability(&self, uuid: RecordUuid) -> Result<ItemAvailability, StoreError>;
}

/// [`ItemLookup`] over any catalog store.
#[derive(Debug)]
pub struct StoreItems<S>(pub Arc<S>);

#[async_trait]
impl<S> ItemLookup for StoreItems<S>
where
    S: LifecycleStore<Entity = CatalogRecord>,
{
    async fn availability(&self, uuid: RecordUuid) -> Result<ItemAvailability, StoreError> {
        let availability = match self.0.find(uuid).await? {
            None => ItemAvailability::Missing,
            Some(record) if record.lifecycle.is_active() => ItemAvailability::Active,
            Some(_) => ItemAvailability::Trashed,
        };

        Ok(availability)
    }
}

/// Kind → store lookup table for bookable items.
#[derive(Clone)]
pub struct ItemCatalog {
    pujas: Arc<dyn ItemLookup>,
    rudraksha: Arc<dyn ItemLookup>,
    bracelets: Arc<dyn ItemLookup>,
}

impl Debug for ItemCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ItemCatalog").finish_non_exhaustive()
    }
}

impl ItemCatalog {
    #[must_use]
    pub fn new(
        pujas: Arc<dyn ItemLookup>,
        rudraksha: Arc<dyn ItemLookup>,
        bracelets: Arc<dyn ItemLookup>,
    ) -> Self {
        Self {
            pujas,
            rudraksha,
            bracelets,
        }
    }

    fn lookup(&self, kind: ItemKind) -> &dyn ItemLookup {
        match kind {
            ItemKind::Puja => self.pujas.as_ref(),
            ItemKind::Rudraksha => self.rudraksha.as_ref(),
            ItemKind::Bracelet => self.bracelets.as_ref(),
        }
    }

    /// Current availability of the referenced item.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    pub async fn availability(&self, item: ItemRef) -> Result<ItemAvailability, StoreError> {
        self.lookup(item.kind).availability(item.uuid).await
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn absent() -> Arc<dyn ItemLookup> {
        let mut lookup = MockItemLookup::new();

        lookup
            .expect_availability()
            .returning(|_| Ok(ItemAvailability::Missing));

        Arc::new(lookup)
    }

    #[tokio::test]
    async fn catalog_routes_each_kind_to_its_own_store() -> TestResult {
        let uuid = RecordUuid::new();

        let mut bracelets = MockItemLookup::new();
        bracelets
            .expect_availability()
            .withf(move |u| *u == uuid)
            .once()
            .returning(|_| Ok(ItemAvailability::Active));

        let catalog = ItemCatalog::new(absent(), absent(), Arc::new(bracelets));

        let bracelet = catalog
            .availability(ItemRef {
                kind: ItemKind::Bracelet,
                uuid,
            })
            .await?;
        let puja = catalog
            .availability(ItemRef {
                kind: ItemKind::Puja,
                uuid,
            })
            .await?;

        assert_eq!(bracelet, ItemAvailability::Active);
        assert_eq!(puja, ItemAvailability::Missing);

        Ok(())
    }
}
