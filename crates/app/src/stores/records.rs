//! Catalog Records Store

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sanctum::{
    assets::AssetHandle,
    catalog::{AssetChange, CatalogRecord, CatalogStore, NewCatalogRecord, detached_assets},
    clock::Clock,
    ids::RecordUuid,
    kinds::EntityKind,
    lifecycle::{
        DeletePrecondition, Lifecycle, LifecycleState, LifecycleStore, StoreError, WriteError,
    },
};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::{
    database::Db,
    stores::errors::{decode_error, store_error},
};

const FIND_RECORD_SQL: &str = include_str!("sql/records/find.sql");
const LOCK_RECORD_SQL: &str = include_str!("sql/records/lock.sql");
const LIST_ACTIVE_RECORDS_SQL: &str = include_str!("sql/records/list_active.sql");
const LIST_TRASHED_RECORDS_SQL: &str = include_str!("sql/records/list_trashed.sql");
const CREATE_RECORD_SQL: &str = include_str!("sql/records/create.sql");
const SET_RECORD_TRASHED_AT_SQL: &str = include_str!("sql/records/set_trashed_at.sql");
const SET_RECORD_ASSETS_SQL: &str = include_str!("sql/records/set_assets.sql");
const DELETE_RECORD_SQL: &str = include_str!("sql/records/delete.sql");

/// Catalog records of one kind, stored in the shared `catalog_records` table.
///
/// Conditional writes lock the row (`FOR UPDATE`) and check the precondition inside
/// the same transaction.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    db: Db,
    kind: EntityKind,
    clock: Arc<dyn Clock>,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(db: Db, kind: EntityKind, clock: Arc<dyn Clock>) -> Self {
        Self { db, kind, clock }
    }

    fn now(&self) -> SqlxTimestamp {
        SqlxTimestamp::from(self.clock.now())
    }

    async fn lock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: RecordUuid,
    ) -> Result<CatalogRecord, WriteError<LifecycleState>> {
        query_as::<Postgres, RecordRow>(LOCK_RECORD_SQL)
            .bind(self.kind.as_str())
            .bind(uuid.into_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?
            .map(RecordRow::into_inner)
            .ok_or(WriteError::NotFound)
    }
}

#[async_trait]
impl LifecycleStore for PgRecordStore {
    type Entity = CatalogRecord;

    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn find(&self, uuid: RecordUuid) -> Result<Option<CatalogRecord>, StoreError> {
        let row = query_as::<Postgres, RecordRow>(FIND_RECORD_SQL)
            .bind(self.kind.as_str())
            .bind(uuid.into_uuid())
            .fetch_optional(self.db.pool())
            .await
            .map_err(store_error)?;

        Ok(row.map(RecordRow::into_inner))
    }

    async fn find_by_state(
        &self,
        state: LifecycleState,
        trashed_before: Option<Timestamp>,
    ) -> Result<Vec<CatalogRecord>, StoreError> {
        let rows = match (state, trashed_before) {
            (LifecycleState::Active, Some(_)) => return Ok(Vec::new()),
            (LifecycleState::Active, None) => {
                query_as::<Postgres, RecordRow>(LIST_ACTIVE_RECORDS_SQL)
                    .bind(self.kind.as_str())
                    .fetch_all(self.db.pool())
                    .await
            }
            (LifecycleState::Trashed, cutoff) => {
                query_as::<Postgres, RecordRow>(LIST_TRASHED_RECORDS_SQL)
                    .bind(self.kind.as_str())
                    .bind(cutoff.map(SqlxTimestamp::from))
                    .fetch_all(self.db.pool())
                    .await
            }
        }
        .map_err(store_error)?;

        Ok(rows.into_iter().map(RecordRow::into_inner).collect())
    }

    async fn transition(
        &self,
        uuid: RecordUuid,
        expected: LifecycleState,
        next: Lifecycle,
    ) -> Result<CatalogRecord, WriteError<LifecycleState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let current = self.lock(&mut tx, uuid).await?.lifecycle.state();

        if current != expected {
            return Err(WriteError::Conflict { current });
        }

        let updated = query_as::<Postgres, RecordRow>(SET_RECORD_TRASHED_AT_SQL)
            .bind(self.kind.as_str())
            .bind(uuid.into_uuid())
            .bind(next.trashed_at().map(SqlxTimestamp::from))
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(updated.into_inner())
    }

    async fn delete(
        &self,
        uuid: RecordUuid,
        precondition: DeletePrecondition,
    ) -> Result<CatalogRecord, WriteError<LifecycleState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let snapshot = self.lock(&mut tx, uuid).await?;

        if !precondition.admits(snapshot.lifecycle) {
            return Err(WriteError::Conflict {
                current: snapshot.lifecycle.state(),
            });
        }

        query(DELETE_RECORD_SQL)
            .bind(self.kind.as_str())
            .bind(uuid.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(snapshot)
    }
}

#[async_trait]
impl CatalogStore for PgRecordStore {
    async fn create(&self, record: NewCatalogRecord) -> Result<CatalogRecord, StoreError> {
        let created = query_as::<Postgres, RecordRow>(CREATE_RECORD_SQL)
            .bind(record.uuid.into_uuid())
            .bind(self.kind.as_str())
            .bind(record.details)
            .bind(handles_to_strings(record.assets))
            .bind(self.now())
            .fetch_one(self.db.pool())
            .await
            .map_err(store_error)?;

        Ok(created.into_inner())
    }

    async fn replace_assets(
        &self,
        uuid: RecordUuid,
        assets: Vec<AssetHandle>,
    ) -> Result<AssetChange, WriteError<LifecycleState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let current = self.lock(&mut tx, uuid).await?;

        if !current.lifecycle.is_active() {
            return Err(WriteError::Conflict {
                current: current.lifecycle.state(),
            });
        }

        let detached = detached_assets(&current.assets, &assets);

        let updated = query_as::<Postgres, RecordRow>(SET_RECORD_ASSETS_SQL)
            .bind(self.kind.as_str())
            .bind(uuid.into_uuid())
            .bind(handles_to_strings(assets))
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(AssetChange {
            record: updated.into_inner(),
            detached,
        })
    }
}

fn handles_to_strings(handles: Vec<AssetHandle>) -> Vec<String> {
    handles.into_iter().map(String::from).collect()
}

struct RecordRow(CatalogRecord);

impl RecordRow {
    fn into_inner(self) -> CatalogRecord {
        self.0
    }
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let kind: String = row.try_get("kind")?;
        let assets: Vec<String> = row.try_get("assets")?;

        Ok(Self(CatalogRecord {
            uuid: RecordUuid::from_uuid(row.try_get("uuid")?),
            kind: kind
                .parse::<EntityKind>()
                .map_err(|source| decode_error("kind", source))?,
            details: row.try_get("details")?,
            assets: assets.into_iter().map(AssetHandle::from).collect(),
            lifecycle: Lifecycle::from_trashed_at(
                row.try_get::<Option<SqlxTimestamp>, _>("trashed_at")?
                    .map(SqlxTimestamp::to_jiff),
            ),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jiff::SignedDuration;
    use sanctum::lifecycle::{EntityLifecycleManager, LifecycleError};
    use serde_json::json;
    use testresult::TestResult;

    use crate::test::TestContext;

    use super::*;

    const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    fn new_record(assets: &[&str]) -> NewCatalogRecord {
        NewCatalogRecord {
            uuid: RecordUuid::new(),
            details: json!({ "title": "Ganesh Puja", "price": 2100 }),
            assets: assets.iter().copied().map(AssetHandle::new).collect(),
        }
    }

    #[tokio::test]
    async fn create_and_find_preserves_details_and_asset_order() -> TestResult {
        let ctx = TestContext::new().await;
        let store = ctx.records(EntityKind::Puja);

        let created = store.create(new_record(&["c.jpg", "a.jpg", "b.jpg"])).await?;
        let found = store.find(created.uuid).await?.ok_or("record not found")?;

        assert_eq!(found, created);
        assert_eq!(found.kind, EntityKind::Puja);
        assert_eq!(found.details["title"], "Ganesh Puja");
        assert_eq!(
            found.assets,
            ["c.jpg", "a.jpg", "b.jpg"].map(AssetHandle::new).to_vec()
        );
        assert_eq!(found.created_at, ctx.clock.now());

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_uuid_is_rejected() -> TestResult {
        let ctx = TestContext::new().await;
        let store = ctx.records(EntityKind::Blog);
        let record = new_record(&[]);

        store.create(record.clone()).await?;
        let duplicate = store.create(record).await;

        assert!(
            matches!(duplicate, Err(StoreError::AlreadyExists)),
            "expected AlreadyExists, got {duplicate:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn stores_only_see_their_own_kind() -> TestResult {
        let ctx = TestContext::new().await;
        let categories = ctx.records(EntityKind::Category);
        let bracelets = ctx.records(EntityKind::Bracelet);

        let category = categories.create(new_record(&[])).await?;

        assert!(bracelets.find(category.uuid).await?.is_none());
        assert!(
            bracelets
                .find_by_state(LifecycleState::Active, None)
                .await?
                .is_empty()
        );

        Ok(())
    }

    #[tokio::test]
    async fn trash_and_restore_round_trip() -> TestResult {
        let ctx = TestContext::new().await;
        let store = Arc::new(ctx.records(EntityKind::Category));
        let manager = EntityLifecycleManager::new(store.clone(), ctx.assets.clone(), ctx.clock.clone());

        let created = store.create(new_record(&["banner.png"])).await?;

        ctx.clock.advance(SignedDuration::from_mins(1))?;
        let trashed = manager.soft_delete(created.uuid).await?;

        assert_eq!(trashed.lifecycle.trashed_at(), Some(ctx.clock.now()));
        assert!(
            store
                .find_by_state(LifecycleState::Active, None)
                .await?
                .is_empty()
        );

        let again = manager.soft_delete(created.uuid).await;
        assert!(
            matches!(again, Err(LifecycleError::AlreadyTrashed)),
            "expected AlreadyTrashed, got {again:?}"
        );

        let restored = manager.restore(created.uuid).await?;

        assert_eq!(restored.lifecycle, Lifecycle::Active);
        assert_eq!(restored.assets, created.assets);
        assert_eq!(restored.details, created.details);
        assert!(ctx.assets.deleted().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn purge_respects_retention_and_releases_assets() -> TestResult {
        let ctx = TestContext::new().await;
        let store = Arc::new(ctx.records(EntityKind::Category));
        let manager = EntityLifecycleManager::new(store.clone(), ctx.assets.clone(), ctx.clock.clone());

        let created = store.create(new_record(&["one.jpg", "two.jpg"])).await?;
        manager.soft_delete(created.uuid).await?;

        let early = manager.purge_expired(THIRTY_DAYS).await?;

        assert_eq!(early.purged, 0);
        assert!(store.find(created.uuid).await?.is_some());

        ctx.clock.advance(SignedDuration::from_hours(24 * 30))?;

        let due = manager.purge_expired(THIRTY_DAYS).await?;

        assert_eq!(due.purged, 1);
        assert_eq!(due.assets.released, 2);
        assert!(store.find(created.uuid).await?.is_none());
        assert_eq!(ctx.assets.deleted(), created.assets);

        Ok(())
    }

    #[tokio::test]
    async fn conditional_delete_skips_restored_records() -> TestResult {
        let ctx = TestContext::new().await;
        let store = ctx.records(EntityKind::Rudraksha);

        let created = store.create(new_record(&[])).await?;
        store
            .transition(
                created.uuid,
                LifecycleState::Active,
                Lifecycle::Trashed {
                    at: ctx.clock.now(),
                },
            )
            .await?;

        ctx.clock.advance(SignedDuration::from_hours(24 * 40))?;
        let cutoff = ctx.clock.now();

        store
            .transition(created.uuid, LifecycleState::Trashed, Lifecycle::Active)
            .await?;

        let result = store
            .delete(created.uuid, DeletePrecondition::TrashedAtOrBefore(cutoff))
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
        assert!(store.find(created.uuid).await?.is_some());

        Ok(())
    }

    #[tokio::test]
    async fn delete_of_missing_record_is_not_found() {
        let ctx = TestContext::new().await;
        let store = ctx.records(EntityKind::Puja);

        let result = store
            .delete(RecordUuid::new(), DeletePrecondition::Any)
            .await;

        assert!(
            matches!(result, Err(WriteError::NotFound)),
            "expected NotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn replace_assets_reports_detached_handles() -> TestResult {
        let ctx = TestContext::new().await;
        let store = ctx.records(EntityKind::Bracelet);

        let created = store.create(new_record(&["a.jpg", "b.jpg"])).await?;
        ctx.clock.advance(SignedDuration::from_secs(5))?;

        let change = store
            .replace_assets(
                created.uuid,
                vec![AssetHandle::new("b.jpg"), AssetHandle::new("c.jpg")],
            )
            .await?;

        assert_eq!(change.detached, vec![AssetHandle::new("a.jpg")]);
        assert_eq!(
            change.record.assets,
            vec![AssetHandle::new("b.jpg"), AssetHandle::new("c.jpg")]
        );
        assert_eq!(change.record.updated_at, ctx.clock.now());

        Ok(())
    }
}
