//! Postgres-backed lifecycle and booking stores.

mod bookings;
mod errors;
mod records;

pub use bookings::PgBookingStore;
pub use records::PgRecordStore;
