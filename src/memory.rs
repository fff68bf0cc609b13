//! In-memory adapters
//!
//! Single-process implementations of the store contracts. Each write holds the map lock
//! for the whole check-and-apply, which gives the same conditional-write semantics the
//! database adapters get from a guarded `UPDATE`/`DELETE`.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::{
    assets::{AssetError, AssetHandle, AssetStore},
    booking::{Booking, BookingState, BookingStore, PaymentState, PaymentUpdate},
    catalog::{AssetChange, CatalogRecord, CatalogStore, NewCatalogRecord, detached_assets},
    clock::Clock,
    ids::{BookingUuid, RecordUuid},
    kinds::EntityKind,
    lifecycle::{
        DeletePrecondition, Lifecycle, LifecycleState, LifecycleStore, StoreError, Trashable,
        WriteError,
    },
};

/// Entities of one kind, keyed by id.
#[derive(Debug)]
pub struct MemoryStore<E: Trashable> {
    kind: EntityKind,
    clock: Arc<dyn Clock>,
    entities: Mutex<FxHashMap<E::Id, E>>,
}

impl<E: Trashable> MemoryStore<E> {
    #[must_use]
    pub fn new(kind: EntityKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            clock,
            entities: Mutex::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    /// All entities, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        let mut entities: Vec<E> = self.entities.lock().values().cloned().collect();

        entities.sort_by_key(Trashable::id);

        entities
    }

    fn insert_new(&self, entity: E) -> Result<(), StoreError> {
        let mut entities = self.entities.lock();

        if entities.contains_key(&entity.id()) {
            return Err(StoreError::AlreadyExists);
        }

        entities.insert(entity.id(), entity);

        Ok(())
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

#[async_trait]
impl<E: Trashable> LifecycleStore for MemoryStore<E> {
    type Entity = E;

    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn find(&self, id: E::Id) -> Result<Option<E>, StoreError> {
        Ok(self.entities.lock().get(&id).cloned())
    }

    async fn find_by_state(
        &self,
        state: LifecycleState,
        trashed_before: Option<Timestamp>,
    ) -> Result<Vec<E>, StoreError> {
        let mut matching: Vec<E> = self
            .entities
            .lock()
            .values()
            .filter(|entity| entity.lifecycle().state() == state)
            .filter(|entity| {
                trashed_before.is_none_or(|cutoff| {
                    entity
                        .lifecycle()
                        .trashed_at()
                        .is_some_and(|at| at <= cutoff)
                })
            })
            .cloned()
            .collect();

        matching.sort_by_key(Trashable::id);

        Ok(matching)
    }

    async fn transition(
        &self,
        id: E::Id,
        expected: LifecycleState,
        next: Lifecycle,
    ) -> Result<E, WriteError<LifecycleState>> {
        let now = self.now();
        let mut entities = self.entities.lock();
        let entity = entities.get_mut(&id).ok_or(WriteError::NotFound)?;

        let current = entity.lifecycle().state();

        if current != expected {
            return Err(WriteError::Conflict { current });
        }

        entity.set_lifecycle(next, now);

        Ok(entity.clone())
    }

    async fn delete(
        &self,
        id: E::Id,
        precondition: DeletePrecondition,
    ) -> Result<E, WriteError<LifecycleState>> {
        let mut entities = self.entities.lock();
        let lifecycle = entities
            .get(&id)
            .map(Trashable::lifecycle)
            .ok_or(WriteError::NotFound)?;

        if !precondition.admits(lifecycle) {
            return Err(WriteError::Conflict {
                current: lifecycle.state(),
            });
        }

        entities.remove(&id).ok_or(WriteError::NotFound)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore<CatalogRecord> {
    async fn create(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError> {
        let now = self.now();

        let created = CatalogRecord {
            uuid: record.uuid,
            kind: self.kind,
            details: record.details,
            assets: record.assets,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.insert_new(created.clone())?;

        Ok(created)
    }

    async fn replace_assets(
        &self,
        uuid: RecordUuid,
        assets: Vec<AssetHandle>,
    ) -> Result<AssetChange, WriteError<LifecycleState>> {
        let now = self.now();
        let mut entities = self.entities.lock();
        let record = entities.get_mut(&uuid).ok_or(WriteError::NotFound)?;

        if !record.lifecycle.is_active() {
            return Err(WriteError::Conflict {
                current: record.lifecycle.state(),
            });
        }

        let detached = detached_assets(&record.assets, &assets);

        record.assets = assets;
        record.updated_at = now;

        Ok(AssetChange {
            record: record.clone(),
            detached,
        })
    }
}

#[async_trait]
impl BookingStore for MemoryStore<Booking> {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.insert_new(booking.clone())
    }

    async fn update_payment(
        &self,
        uuid: BookingUuid,
        expected: PaymentState,
        update: PaymentUpdate,
    ) -> Result<Booking, WriteError<PaymentState>> {
        let now = self.now();
        let mut entities = self.entities.lock();
        let booking = entities.get_mut(&uuid).ok_or(WriteError::NotFound)?;

        if booking.payment_state != expected {
            return Err(WriteError::Conflict {
                current: booking.payment_state,
            });
        }

        update.apply(booking, now);

        Ok(booking.clone())
    }

    async fn cancel(&self, uuid: BookingUuid) -> Result<Booking, WriteError<BookingState>> {
        let now = self.now();
        let mut entities = self.entities.lock();
        let booking = entities.get_mut(&uuid).ok_or(WriteError::NotFound)?;

        if booking.booking_state != BookingState::Pending {
            return Err(WriteError::Conflict {
                current: booking.booking_state,
            });
        }

        booking.booking_state = BookingState::Cancelled;
        booking.updated_at = now;

        Ok(booking.clone())
    }
}

/// Asset store that keeps bytes in memory and records every delete it receives.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    files: Mutex<FxHashMap<AssetHandle, Vec<u8>>>,
    deletes: Mutex<Vec<AssetHandle>>,
}

impl MemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, handle: &AssetHandle) -> bool {
        self.files.lock().contains_key(handle)
    }

    /// Every handle passed to `delete`, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<AssetHandle> {
        self.deletes.lock().clone()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn store(&self, bytes: Vec<u8>, extension: &str) -> Result<AssetHandle, AssetError> {
        let handle = AssetHandle::new(format!("{}.{extension}", Uuid::now_v7().simple()));

        self.files.lock().insert(handle.clone(), bytes);

        Ok(handle)
    }

    async fn delete(&self, handle: &AssetHandle) -> Result<(), AssetError> {
        self.files.lock().remove(handle);
        self.deletes.lock().push(handle.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use serde_json::json;
    use testresult::TestResult;

    use crate::clock::ManualClock;

    use super::*;

    fn store() -> (Arc<ManualClock>, MemoryStore<CatalogRecord>) {
        let clock = Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH));
        let store = MemoryStore::new(EntityKind::Category, clock.clone());

        (clock, store)
    }

    #[tokio::test]
    async fn create_rejects_duplicate_uuid() -> TestResult {
        let (_, store) = store();
        let uuid = RecordUuid::new();
        let record = NewCatalogRecord {
            uuid,
            details: json!({ "name": "Navagraha" }),
            assets: vec![],
        };

        store.create(record.clone()).await?;
        let duplicate = store.create(record).await;

        assert!(
            matches!(duplicate, Err(StoreError::AlreadyExists)),
            "expected AlreadyExists, got {duplicate:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn transition_checks_expected_state() -> TestResult {
        let (clock, store) = store();
        let record = store
            .create(NewCatalogRecord {
                uuid: RecordUuid::new(),
                details: json!({}),
                assets: vec![],
            })
            .await?;

        let result = store
            .transition(record.uuid, LifecycleState::Trashed, Lifecycle::Active)
            .await;

        assert!(
            matches!(
                result,
                Err(WriteError::Conflict {
                    current: LifecycleState::Active
                })
            ),
            "expected Conflict, got {result:?}"
        );

        clock.advance(SignedDuration::from_secs(10))?;
        let trashed = store
            .transition(
                record.uuid,
                LifecycleState::Active,
                Lifecycle::Trashed { at: clock.now() },
            )
            .await?;

        assert_eq!(trashed.updated_at, clock.now());
        assert_eq!(trashed.created_at, record.created_at);

        Ok(())
    }

    #[tokio::test]
    async fn find_by_state_filters_on_cutoff() -> TestResult {
        let (clock, store) = store();
        let mut uuids = Vec::new();

        for _ in 0..3 {
            let record = store
                .create(NewCatalogRecord {
                    uuid: RecordUuid::new(),
                    details: json!({}),
                    assets: vec![],
                })
                .await?;

            store
                .transition(
                    record.uuid,
                    LifecycleState::Active,
                    Lifecycle::Trashed { at: clock.now() },
                )
                .await?;

            uuids.push(record.uuid);
            clock.advance(SignedDuration::from_hours(1))?;
        }

        let cutoff = Timestamp::UNIX_EPOCH + SignedDuration::from_hours(1);
        let expired = store
            .find_by_state(LifecycleState::Trashed, Some(cutoff))
            .await?;
        let active = store.find_by_state(LifecycleState::Active, None).await?;

        assert_eq!(
            expired.iter().map(|r| r.uuid).collect::<Vec<_>>(),
            uuids.get(..2).ok_or("expected three records")?
        );
        assert!(active.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn replace_assets_preserves_order_and_reports_detached() -> TestResult {
        let (_, store) = store();
        let record = store
            .create(NewCatalogRecord {
                uuid: RecordUuid::new(),
                details: json!({}),
                assets: ["front.jpg", "back.jpg", "box.jpg"].map(AssetHandle::new).to_vec(),
            })
            .await?;

        let change = store
            .replace_assets(
                record.uuid,
                ["box.jpg", "new.jpg", "front.jpg"].map(AssetHandle::new).to_vec(),
            )
            .await?;

        assert_eq!(
            change.record.assets,
            ["box.jpg", "new.jpg", "front.jpg"].map(AssetHandle::new).to_vec()
        );
        assert_eq!(change.detached, vec![AssetHandle::new("back.jpg")]);

        Ok(())
    }

    #[tokio::test]
    async fn replace_assets_rejects_trashed_records() -> TestResult {
        let (clock, store) = store();
        let record = store
            .create(NewCatalogRecord {
                uuid: RecordUuid::new(),
                details: json!({}),
                assets: vec![AssetHandle::new("a.png")],
            })
            .await?;

        store
            .transition(
                record.uuid,
                LifecycleState::Active,
                Lifecycle::Trashed { at: clock.now() },
            )
            .await?;

        let result = store.replace_assets(record.uuid, vec![]).await;

        assert!(
            matches!(
                result,
                Err(WriteError::Conflict {
                    current: LifecycleState::Trashed
                })
            ),
            "expected Conflict, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn asset_store_records_deletes_of_absent_files() -> TestResult {
        let assets = MemoryAssetStore::new();
        let handle = assets.store(b"jpeg".to_vec(), "jpg").await?;

        assert!(assets.contains(&handle));

        assets.delete(&handle).await?;
        assets.delete(&handle).await?;

        assert!(!assets.contains(&handle));
        assert_eq!(assets.deleted(), vec![handle.clone(), handle]);

        Ok(())
    }
}
