//! Lifecycle State

use std::fmt::{Display, Formatter, Result as FmtResult};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Persisted lifecycle of an entity.
///
/// `Purged` is never stored: purging removes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Visible to normal reads.
    Active,
    /// Soft deleted at `at`.
    Trashed { at: Timestamp },
}

impl Lifecycle {
    #[must_use]
    pub const fn state(self) -> LifecycleState {
        match self {
            Self::Active => LifecycleState::Active,
            Self::Trashed { .. } => LifecycleState::Trashed,
        }
    }

    #[must_use]
    pub const fn trashed_at(self) -> Option<Timestamp> {
        match self {
            Self::Active => None,
            Self::Trashed { at } => Some(at),
        }
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Build from the nullable `trashed_at` column used by storage backends.
    #[must_use]
    pub const fn from_trashed_at(trashed_at: Option<Timestamp>) -> Self {
        match trashed_at {
            None => Self::Active,
            Some(at) => Self::Trashed { at },
        }
    }
}

/// Lifecycle discriminant, used for queries and write preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Visible to normal reads.
    Active,
    /// In the trash, awaiting restore or purge.
    Trashed,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Active => "active",
            Self::Trashed => "trashed",
        })
    }
}
