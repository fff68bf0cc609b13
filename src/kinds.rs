//! Entity and purchasable item kinds

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every trash-capable entity type managed by the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Catalog category.
    Category,
    /// Bookable puja.
    Puja,
    /// Blog post.
    Blog,
    /// Rudraksha bead listing.
    Rudraksha,
    /// Bracelet listing.
    Bracelet,
    /// Paid booking of a catalog item.
    Booking,
    /// Puja booking request held as a catalog record.
    PujaBooking,
}

impl EntityKind {
    /// All kinds, in registration order.
    pub const ALL: [Self; 7] = [
        Self::Category,
        Self::Puja,
        Self::Blog,
        Self::Rudraksha,
        Self::Bracelet,
        Self::Booking,
        Self::PujaBooking,
    ];

    /// Stable slug used in storage and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Puja => "puja",
            Self::Blog => "blog",
            Self::Rudraksha => "rudraksha",
            Self::Bracelet => "bracelet",
            Self::Booking => "booking",
            Self::PujaBooking => "puja_booking",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownKind(value.to_string()))
    }
}

/// The closed set of things a booking can be made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A puja.
    Puja,
    /// A rudraksha bead.
    Rudraksha,
    /// A bracelet.
    Bracelet,
}

impl ItemKind {
    /// Same slug as the backing entity kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.entity_kind().as_str()
    }

    /// The catalog entity type that stores items of this kind.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::Puja => EntityKind::Puja,
            Self::Rudraksha => EntityKind::Rudraksha,
            Self::Bracelet => EntityKind::Bracelet,
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "puja" => Ok(Self::Puja),
            "rudraksha" => Ok(Self::Rudraksha),
            "bracelet" => Ok(Self::Bracelet),
            _ => Err(UnknownKind(value.to_string())),
        }
    }
}

/// A discriminator that names no known kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown kind `{0}`")]
pub struct UnknownKind(pub String);
