//! Lifecycle errors.

use thiserror::Error;

use crate::lifecycle::StoreError;

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No entity with that id exists, in either state.
    #[error("entity not found")]
    NotFound,

    /// Soft delete of an entity that is already trashed, or an edit of a trashed one.
    #[error("entity is already in the trash")]
    AlreadyTrashed,

    /// Restore of an active entity.
    #[error("entity is not in the trash")]
    NotTrashed,

    /// The entity changed state between the read and the conditional write.
    #[error("entity was modified concurrently; re-read and retry")]
    ConcurrentModification,

    /// The retention window reaches past the representable timestamp range.
    #[error("retention window is out of range")]
    RetentionOutOfRange(#[source] jiff::Error),

    /// The backing store failed.
    #[error("storage error")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Whether the entity is already in the requested state.
    ///
    /// Clients treat these as benign repeats rather than failures.
    #[must_use]
    pub const fn is_already_in_state(&self) -> bool {
        matches!(self, Self::AlreadyTrashed | Self::NotTrashed)
    }
}
