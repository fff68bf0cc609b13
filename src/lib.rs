//! Sanctum
//!
//! Storage-agnostic core of the Sanctum catalog and booking backend: a trash, restore
//! and purge lifecycle shared by every entity type, a periodic purge scheduler, and a
//! booking coordinator that settles payments through a third-party gateway.

pub mod assets;
pub mod booking;
pub mod catalog;
pub mod clock;
pub mod ids;
pub mod kinds;
pub mod lifecycle;
pub mod memory;
pub mod purge;
