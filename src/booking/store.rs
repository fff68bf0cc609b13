//! Booking persistence contract

use async_trait::async_trait;

use crate::{
    booking::{Booking, BookingState, PaymentState, PaymentUpdate},
    ids::BookingUuid,
    lifecycle::{LifecycleStore, StoreError, WriteError},
};

/// Storage for bookings, on top of the shared lifecycle operations.
#[async_trait]
pub trait BookingStore: LifecycleStore<Entity = Booking> {
    /// Persist a new booking.
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Apply `update` if the payment is currently in `expected`, as one atomic write.
    async fn update_payment(
        &self,
        uuid: BookingUuid,
        expected: PaymentState,
        update: PaymentUpdate,
    ) -> Result<Booking, WriteError<PaymentState>>;

    /// Cancel the booking if it is still pending, as one atomic write.
    async fn cancel(&self, uuid: BookingUuid) -> Result<Booking, WriteError<BookingState>>;
}
