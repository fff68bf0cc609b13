//! Booking and payment coordination

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    booking::{
        Booking, BookerDetails, BookingError, BookingState, BookingStore, GatewayError,
        GatewayOrder, ItemAvailability, ItemCatalog, ItemRef, MAX_AMOUNT, PaymentGateway,
        PaymentState, PaymentUpdate, signatures_match,
    },
    clock::Clock,
    ids::{BookingUuid, RecordUuid},
    kinds::{ItemKind, UnknownKind},
    lifecycle::{EntityLifecycleManager, Lifecycle, LifecycleStore, WriteError},
};

/// Checkout settings shared by every booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// ISO 4217 code sent to the gateway.
    pub currency: String,
    pub gateway_timeout: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// Input to [`BookingPaymentCoordinator::create_booking`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Kind slug as sent by the client, e.g. `puja`.
    pub item_kind: String,
    pub item_uuid: RecordUuid,
    pub amount: u64,
    pub booker: BookerDetails,
}

/// A persisted pending booking and the order the client pays against.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub order: GatewayOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentVerification {
    /// This call settled the payment.
    Confirmed(Booking),

    /// The payment had already been settled by an earlier (or concurrent) call.
    AlreadyVerified(Booking),
}

impl PaymentVerification {
    #[must_use]
    pub fn booking(&self) -> &Booking {
        match self {
            Self::Confirmed(booking) | Self::AlreadyVerified(booking) => booking,
        }
    }

    #[must_use]
    pub fn into_booking(self) -> Booking {
        match self {
            Self::Confirmed(booking) | Self::AlreadyVerified(booking) => booking,
        }
    }
}

/// Creates bookings against a payment gateway and settles them on verified payments.
///
/// Trash, restore and purge of bookings go through [`Self::lifecycle`].
pub struct BookingPaymentCoordinator<B> {
    lifecycle: EntityLifecycleManager<B>,
    items: ItemCatalog,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl<B: BookingStore> Debug for BookingPaymentCoordinator<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BookingPaymentCoordinator")
            .field("lifecycle", &self.lifecycle)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<B: BookingStore> BookingPaymentCoordinator<B> {
    #[must_use]
    pub fn new(
        lifecycle: EntityLifecycleManager<B>,
        items: ItemCatalog,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            lifecycle,
            items,
            gateway,
            settings,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &EntityLifecycleManager<B> {
        &self.lifecycle
    }

    #[must_use]
    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Validate the item, open a gateway order and persist a pending booking.
    ///
    /// Nothing is persisted unless the gateway returns an order.
    ///
    /// # Errors
    ///
    /// - `InvalidItemKind` for kinds that cannot be booked.
    /// - `InvalidAmount` for a zero amount or one above [`MAX_AMOUNT`].
    /// - `ItemNotFound` if the item is missing or in the trash.
    /// - `GatewayTimeout` / `Gateway` if the order could not be created.
    #[instrument(
        skip(self, request),
        fields(item_kind = %request.item_kind, item = %request.item_uuid, amount = request.amount)
    )]
    pub async fn create_booking(
        &self,
        request: BookingRequest,
    ) -> Result<CreatedBooking, BookingError> {
        let kind = request
            .item_kind
            .parse::<ItemKind>()
            .map_err(|UnknownKind(kind)| BookingError::InvalidItemKind(kind))?;

        if request.amount == 0 || request.amount > MAX_AMOUNT {
            return Err(BookingError::InvalidAmount);
        }

        let item = ItemRef {
            kind,
            uuid: request.item_uuid,
        };

        match self.items.availability(item).await? {
            ItemAvailability::Active => {}
            ItemAvailability::Missing | ItemAvailability::Trashed => {
                return Err(BookingError::ItemNotFound);
            }
        }

        let uuid = BookingUuid::new();
        let order = self.create_order(request.amount, &receipt_for(uuid)).await?;
        let now = self.lifecycle.clock().now();

        let booking = Booking {
            uuid,
            item,
            amount: request.amount,
            currency: order.currency.clone(),
            booker: request.booker,
            payment_state: PaymentState::Pending,
            booking_state: BookingState::Pending,
            gateway_order_id: order.order_id.clone(),
            gateway_payment_id: None,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };

        self.lifecycle.store().insert(&booking).await?;

        info!(booking = %uuid, order_id = %order.order_id, "booking created");

        Ok(CreatedBooking { booking, order })
    }

    async fn create_order(&self, amount: u64, receipt: &str) -> Result<GatewayOrder, BookingError> {
        let timeout = self.settings.gateway_timeout;
        let call = self
            .gateway
            .create_order(amount, &self.settings.currency, receipt, timeout);

        let order = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(order)) => order,
            Ok(Err(error)) => {
                warn!(%error, "gateway order creation failed");
                return Err(error.into());
            }
            Err(_elapsed) => {
                warn!(?timeout, "gateway order creation timed out");
                return Err(BookingError::GatewayTimeout);
            }
        };

        if order.amount != amount {
            warn!(
                requested = amount,
                returned = order.amount,
                "gateway returned an order for a different amount"
            );

            return Err(BookingError::Gateway(GatewayError::InvalidResponse(
                "order amount differs from the requested amount".to_string(),
            )));
        }

        Ok(order)
    }

    /// Settle a payment reported by the client.
    ///
    /// The signature is checked before any state is read for writing. Repeating a
    /// successful verification returns [`PaymentVerification::AlreadyVerified`].
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking does not exist.
    /// - `InvalidSignature` if the signature does not match; the booking is unchanged.
    /// - `ConcurrentModification` if the payment was marked failed in the meantime.
    #[instrument(skip(self, signature), fields(booking = %uuid))]
    pub async fn verify_payment(
        &self,
        uuid: BookingUuid,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentVerification, BookingError> {
        let store = self.lifecycle.store();
        let booking = store.find(uuid).await?.ok_or(BookingError::NotFound)?;

        let expected = self
            .gateway
            .expected_signature(&booking.gateway_order_id, payment_id);

        if !signatures_match(&expected, signature) {
            warn!(
                target: "sanctum::audit",
                booking = %uuid,
                order_id = %booking.gateway_order_id,
                payment_id,
                "payment signature mismatch"
            );

            return Err(BookingError::InvalidSignature);
        }

        if booking.payment_state == PaymentState::Paid {
            info!("payment already verified");
            audit_settled_payment(&booking, payment_id);
            return Ok(PaymentVerification::AlreadyVerified(booking));
        }

        let update = PaymentUpdate::Paid {
            payment_id: payment_id.to_string(),
        };

        match store.update_payment(uuid, PaymentState::Pending, update).await {
            Ok(confirmed) => {
                info!(payment_id, "payment verified, booking confirmed");
                Ok(PaymentVerification::Confirmed(confirmed))
            }
            Err(WriteError::Conflict {
                current: PaymentState::Paid,
            }) => {
                let settled = store.find(uuid).await?.ok_or(BookingError::NotFound)?;
                audit_settled_payment(&settled, payment_id);
                Ok(PaymentVerification::AlreadyVerified(settled))
            }
            Err(WriteError::Conflict { .. }) => Err(BookingError::ConcurrentModification),
            Err(WriteError::NotFound) => Err(BookingError::NotFound),
            Err(WriteError::Store(source)) => Err(source.into()),
        }
    }

    /// Record a failed payment attempt. The booking itself stays pending.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `ConcurrentModification` unless the payment is pending.
    #[instrument(skip(self), fields(booking = %uuid))]
    pub async fn mark_payment_failed(&self, uuid: BookingUuid) -> Result<Booking, BookingError> {
        let result = self
            .lifecycle
            .store()
            .update_payment(uuid, PaymentState::Pending, PaymentUpdate::Failed)
            .await;

        match result {
            Ok(booking) => {
                info!("payment marked failed");
                Ok(booking)
            }
            Err(WriteError::NotFound) => Err(BookingError::NotFound),
            Err(WriteError::Conflict { .. }) => Err(BookingError::ConcurrentModification),
            Err(WriteError::Store(source)) => Err(source.into()),
        }
    }

    /// Cancel a booking that has not been confirmed.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `ConcurrentModification` if it is no longer pending.
    #[instrument(skip(self), fields(booking = %uuid))]
    pub async fn cancel_booking(&self, uuid: BookingUuid) -> Result<Booking, BookingError> {
        match self.lifecycle.store().cancel(uuid).await {
            Ok(booking) => {
                info!("booking cancelled");
                Ok(booking)
            }
            Err(WriteError::NotFound) => Err(BookingError::NotFound),
            Err(WriteError::Conflict { .. }) => Err(BookingError::ConcurrentModification),
            Err(WriteError::Store(source)) => Err(source.into()),
        }
    }
}

/// A signed callback for a settled booking naming another payment may be a double charge.
fn audit_settled_payment(booking: &Booking, payment_id: &str) {
    if booking.gateway_payment_id.as_deref() != Some(payment_id) {
        warn!(
            target: "sanctum::audit",
            booking = %booking.uuid,
            order_id = %booking.gateway_order_id,
            settled_payment_id = booking.gateway_payment_id.as_deref(),
            payment_id,
            "signed payment differs from the settled one"
        );
    }
}

/// Receipt reference sent to the gateway for a booking.
#[must_use]
pub fn receipt_for(uuid: BookingUuid) -> String {
    format!("rcpt_{}", uuid.into_uuid().simple())
}
