//! Entity Lifecycle Manager

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use jiff::{SignedDuration, Timestamp};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    assets::{AssetHandle, AssetStore},
    catalog::{AssetChange, CatalogStore},
    clock::Clock,
    ids::RecordUuid,
    kinds::EntityKind,
    lifecycle::{
        DeletePrecondition, IdOf, Lifecycle, LifecycleError, LifecycleState, LifecycleStore,
        Trashable, WriteError,
    },
};

/// Outcome of releasing a set of asset handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetRelease {
    /// Handles the asset store confirmed as deleted.
    pub released: usize,
    /// Handles left behind as orphans after a failed delete.
    pub failed: usize,
}

impl AssetRelease {
    fn absorb(&mut self, other: Self) {
        self.released += other.released;
        self.failed += other.failed;
    }
}

/// Result of a successful hard delete.
#[derive(Debug, Clone)]
pub struct Removal<E> {
    /// Snapshot of the entity as it was when removed.
    pub entity: E,
    /// Release of the assets the entity referenced.
    pub assets: AssetRelease,
}

/// Result of replacing a catalog record's assets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReplacement {
    /// The record and the handles it no longer references.
    pub change: AssetChange,
    /// Release of the detached handles.
    pub assets: AssetRelease,
}

/// Counters for one `purge_expired` pass over an entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Expired candidates found by the scan.
    pub scanned: usize,
    /// Removed by this pass.
    pub purged: usize,
    /// Already removed by an overlapping purge or hard delete.
    pub already_gone: usize,
    /// Restored (or re-trashed) between the scan and the delete.
    pub skipped: usize,
    /// Deletes that failed in the store; retried on the next pass.
    pub store_failures: usize,
    /// Release of the purged entities' assets.
    pub assets: AssetRelease,
}

/// Trash, restore and purge state machine for one entity type.
///
/// Record transitions are delegated to the store's conditional writes; assets are
/// only touched once a record has been removed, and only by the caller that removed it.
pub struct EntityLifecycleManager<S> {
    store: Arc<S>,
    assets: Arc<dyn AssetStore>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for EntityLifecycleManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            assets: Arc::clone(&self.assets),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: LifecycleStore> Debug for EntityLifecycleManager<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EntityLifecycleManager")
            .field("kind", &self.store.kind())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S: LifecycleStore> EntityLifecycleManager<S> {
    #[must_use]
    pub fn new(store: Arc<S>, assets: Arc<dyn AssetStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            assets,
            clock,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.store.kind()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Move an active entity to the trash. Assets are left untouched.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `AlreadyTrashed` if it is already in the trash.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn soft_delete(&self, id: IdOf<S>) -> Result<S::Entity, LifecycleError> {
        let trashed = Lifecycle::Trashed {
            at: self.clock.now(),
        };

        let result = self
            .store
            .transition(id, LifecycleState::Active, trashed)
            .await;

        match result {
            Ok(entity) => {
                info!("moved to trash");
                Ok(entity)
            }
            Err(WriteError::Conflict {
                current: LifecycleState::Trashed,
            }) => Err(LifecycleError::AlreadyTrashed),
            Err(error) => Err(unexpected_write_error(error)),
        }
    }

    /// Bring a trashed entity back, exactly as it was before trashing.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `NotTrashed` if it is active.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn restore(&self, id: IdOf<S>) -> Result<S::Entity, LifecycleError> {
        let result = self
            .store
            .transition(id, LifecycleState::Trashed, Lifecycle::Active)
            .await;

        match result {
            Ok(entity) => {
                info!("restored from trash");
                Ok(entity)
            }
            Err(WriteError::Conflict {
                current: LifecycleState::Active,
            }) => Err(LifecycleError::NotTrashed),
            Err(error) => Err(unexpected_write_error(error)),
        }
    }

    /// Permanently remove an entity in either state and release its assets.
    ///
    /// The record is claimed with a single delete first so that exactly one caller
    /// releases the assets; asset failures are logged and counted, never returned.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent (including when a concurrent purge removed it first).
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn hard_delete(&self, id: IdOf<S>) -> Result<Removal<S::Entity>, LifecycleError> {
        let entity = self
            .store
            .delete(id, DeletePrecondition::Any)
            .await
            .map_err(unexpected_write_error)?;

        let assets = self.release(entity.assets()).await;

        info!(
            released = assets.released,
            failed = assets.failed,
            "hard deleted"
        );

        Ok(Removal { entity, assets })
    }

    /// Purge every entity that has been in the trash for at least `retention`.
    ///
    /// Safe to run concurrently with itself and with restores: each removal is
    /// conditional on the entity still being trashed before the cutoff.
    ///
    /// # Errors
    ///
    /// Fails only if the retention window cannot be applied or the scan itself fails;
    /// per-entity failures are counted in the report.
    #[instrument(skip(self), fields(kind = %self.kind()))]
    pub async fn purge_expired(&self, retention: Duration) -> Result<PurgeReport, LifecycleError> {
        let cutoff = retention_cutoff(self.clock.now(), retention)?;

        let candidates = self
            .store
            .find_by_state(LifecycleState::Trashed, Some(cutoff))
            .await?;

        let mut report = PurgeReport {
            scanned: candidates.len(),
            ..PurgeReport::default()
        };

        for candidate in candidates {
            let id = candidate.id();

            match self
                .store
                .delete(id, DeletePrecondition::TrashedAtOrBefore(cutoff))
                .await
            {
                Ok(entity) => {
                    report.purged += 1;
                    report.assets.absorb(self.release(entity.assets()).await);
                }
                Err(WriteError::NotFound) => {
                    debug!(%id, "already purged elsewhere");
                    report.already_gone += 1;
                }
                Err(WriteError::Conflict { current }) => {
                    debug!(%id, %current, "no longer expired, skipping");
                    report.skipped += 1;
                }
                Err(WriteError::Store(source)) => {
                    error!(%id, error = %source, "failed to purge");
                    report.store_failures += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            purged = report.purged,
            already_gone = report.already_gone,
            skipped = report.skipped,
            store_failures = report.store_failures,
            asset_failures = report.assets.failed,
            "purge pass finished"
        );

        Ok(report)
    }

    /// Delete each handle, best effort. Failures leave orphaned files and are only logged.
    pub async fn release(&self, handles: &[AssetHandle]) -> AssetRelease {
        let mut outcome = AssetRelease::default();

        for handle in handles {
            match self.assets.delete(handle).await {
                Ok(()) => outcome.released += 1,
                Err(source) => {
                    warn!(%handle, error = %source, "failed to delete asset, leaving orphan");
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

impl<S: CatalogStore> EntityLifecycleManager<S> {
    /// Replace an active record's ordered asset list and release the handles it drops.
    ///
    /// Handles are released only after the write commits, and only those the write
    /// detached, so a handle kept in the new list is never deleted.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `AlreadyTrashed` if the record is in the trash.
    #[instrument(skip(self, assets), fields(kind = %self.kind(), count = assets.len()))]
    pub async fn replace_assets(
        &self,
        uuid: RecordUuid,
        assets: Vec<AssetHandle>,
    ) -> Result<AssetReplacement, LifecycleError> {
        let change = match self.store.replace_assets(uuid, assets).await {
            Ok(change) => change,
            Err(WriteError::Conflict {
                current: LifecycleState::Trashed,
            }) => return Err(LifecycleError::AlreadyTrashed),
            Err(error) => return Err(unexpected_write_error(error)),
        };

        let assets = self.release(&change.detached).await;

        info!(
            released = assets.released,
            failed = assets.failed,
            "replaced assets"
        );

        Ok(AssetReplacement { change, assets })
    }
}

fn retention_cutoff(now: Timestamp, retention: Duration) -> Result<Timestamp, LifecycleError> {
    SignedDuration::try_from(retention)
        .and_then(|window| now.checked_sub(window))
        .map_err(LifecycleError::RetentionOutOfRange)
}

fn unexpected_write_error(error: WriteError<LifecycleState>) -> LifecycleError {
    match error {
        WriteError::NotFound => LifecycleError::NotFound,
        WriteError::Conflict { .. } => LifecycleError::ConcurrentModification,
        WriteError::Store(source) => LifecycleError::Store(source),
    }
}
