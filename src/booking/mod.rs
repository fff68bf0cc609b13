//! Bookings and payment verification

mod coordinator;
mod errors;
mod gateway;
mod items;
mod models;
mod store;

pub use coordinator::*;
pub use errors::BookingError;
pub use gateway::*;
pub use items::*;
pub use models::*;
pub use store::BookingStore;
