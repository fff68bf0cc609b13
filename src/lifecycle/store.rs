//! Lifecycle persistence contract

use std::{
    error::Error as StdError,
    fmt::{Debug, Display},
    hash::Hash,
};

use async_trait::async_trait;
use jiff::Timestamp;
use thiserror::Error;

use crate::{
    assets::AssetHandle,
    kinds::EntityKind,
    lifecycle::{Lifecycle, LifecycleState},
};

/// An entity that can be trashed, restored and purged.
pub trait Trashable: Clone + Debug + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    fn lifecycle(&self) -> Lifecycle;

    /// Owned asset handles, in display order.
    fn assets(&self) -> &[AssetHandle];

    /// Apply a lifecycle change; used by store adapters that hold entities in memory.
    fn set_lifecycle(&mut self, lifecycle: Lifecycle, updated_at: Timestamp);
}

/// Identifier type of the entities held by store `S`.
pub type IdOf<S> = <<S as LifecycleStore>::Entity as Trashable>::Id;

/// Precondition checked atomically by [`LifecycleStore::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePrecondition {
    /// Remove regardless of lifecycle.
    Any,

    /// Remove only if trashed at or before the cutoff.
    TrashedAtOrBefore(Timestamp),
}

impl DeletePrecondition {
    #[must_use]
    pub fn admits(self, lifecycle: Lifecycle) -> bool {
        match (self, lifecycle) {
            (Self::Any, _) => true,
            (Self::TrashedAtOrBefore(cutoff), Lifecycle::Trashed { at }) => at <= cutoff,
            (Self::TrashedAtOrBefore(_), Lifecycle::Active) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("storage backend failure")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend(error.into())
    }
}

/// Failure of a conditional write whose precondition is expressed over `S`.
#[derive(Debug, Error)]
pub enum WriteError<S: Debug> {
    #[error("record not found")]
    NotFound,

    #[error("precondition failed, record is currently {current:?}")]
    Conflict { current: S },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage for one entity type.
///
/// Every mutating method is a single conditional write: implementations must check the
/// precondition and apply the change atomically, never as a separate read then write.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    type Entity: Trashable;

    fn kind(&self) -> EntityKind;

    async fn find(&self, id: IdOf<Self>) -> Result<Option<Self::Entity>, StoreError>;

    /// Entities in `state`; when `trashed_before` is set, only those trashed at or before it.
    async fn find_by_state(
        &self,
        state: LifecycleState,
        trashed_before: Option<Timestamp>,
    ) -> Result<Vec<Self::Entity>, StoreError>;

    /// Move the entity to `next` if it is currently in `expected`.
    async fn transition(
        &self,
        id: IdOf<Self>,
        expected: LifecycleState,
        next: Lifecycle,
    ) -> Result<Self::Entity, WriteError<LifecycleState>>;

    /// Remove the entity if `precondition` admits it, returning the removed snapshot.
    async fn delete(
        &self,
        id: IdOf<Self>,
        precondition: DeletePrecondition,
    ) -> Result<Self::Entity, WriteError<LifecycleState>>;
}
