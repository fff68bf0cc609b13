//! Trash / restore / purge lifecycle shared by every entity type.

mod errors;
mod manager;
mod state;
mod store;

pub use errors::LifecycleError;
pub use manager::*;
pub use state::{Lifecycle, LifecycleState};
pub use store::*;
