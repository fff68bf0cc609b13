//! Booking errors.

use thiserror::Error;

use crate::{
    booking::{GatewayError, MAX_AMOUNT},
    lifecycle::StoreError,
};

/// Errors returned by the booking coordinator.
#[derive(Debug, Error)]
pub enum BookingError {
    /// No booking with that id exists.
    #[error("booking not found")]
    NotFound,

    /// The item kind slug names nothing that can be booked.
    #[error("`{0}` is not a bookable item kind")]
    InvalidItemKind(String),

    /// The item does not exist or is in the trash.
    #[error("item not found or in the trash")]
    ItemNotFound,

    /// The amount is zero or too large to store.
    #[error("amount must be greater than zero and at most {max}", max = MAX_AMOUNT)]
    InvalidAmount,

    /// The payment signature does not match the gateway's.
    #[error("payment signature does not match")]
    InvalidSignature,

    /// The gateway did not answer within the checkout timeout.
    #[error("payment gateway timed out")]
    GatewayTimeout,

    /// The gateway rejected the request or returned something unusable.
    #[error("payment gateway error")]
    Gateway(#[source] GatewayError),

    /// The booking changed state between the read and the conditional write.
    #[error("booking was modified concurrently; re-read and retry")]
    ConcurrentModification,

    /// The backing store failed.
    #[error("storage error")]
    Store(#[from] StoreError),
}

impl From<GatewayError> for BookingError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Timeout => Self::GatewayTimeout,
            other => Self::Gateway(other),
        }
    }
}
