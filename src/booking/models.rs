//! Booking Models

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    assets::AssetHandle,
    ids::{BookingUuid, RecordUuid},
    kinds::{ItemKind, UnknownKind},
    lifecycle::{Lifecycle, Trashable},
};

/// What a booking is for: exactly one purchasable catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub uuid: RecordUuid,
}

/// Where the payment for a booking stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Order created, no verified payment yet.
    Pending,

    /// A correctly signed payment was verified.
    Paid,

    /// The gateway reported the payment attempt failed.
    Failed,
}

/// Where the booking itself stands. Independent of trash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    /// Awaiting payment.
    Pending,

    /// Paid and confirmed.
    Confirmed,

    /// Cancelled before confirmation.
    Cancelled,
}

impl PaymentState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl BookingState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl Display for BookingState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownKind(value.to_string())),
        }
    }
}

impl FromStr for BookingState {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(UnknownKind(value.to_string())),
        }
    }
}

/// Contact details of the person booking.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Largest amount a booking can carry; storage keeps amounts as signed 64-bit.
pub const MAX_AMOUNT: u64 = i64::MAX.unsigned_abs();

/// Booking Model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub uuid: BookingUuid,
    pub item: ItemRef,
    /// Amount in the smallest currency unit (paise for INR).
    pub amount: u64,
    /// ISO 4217 code the order was created in.
    pub currency: String,
    pub booker: BookerDetails,
    pub payment_state: PaymentState,
    pub booking_state: BookingState,
    pub gateway_order_id: String,
    /// Set once, by the verification that settled the payment.
    pub gateway_payment_id: Option<String>,
    pub lifecycle: Lifecycle,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    /// A confirmed booking must have been paid.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.booking_state != BookingState::Confirmed || self.payment_state == PaymentState::Paid
    }
}

impl Trashable for Booking {
    type Id = BookingUuid;

    fn id(&self) -> BookingUuid {
        self.uuid
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn assets(&self) -> &[AssetHandle] {
        &[]
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle, updated_at: Timestamp) {
        self.lifecycle = lifecycle;
        self.updated_at = updated_at;
    }
}

/// Payment outcome applied by a conditional write on a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentUpdate {
    /// Settle the payment and confirm the booking in the same write.
    Paid { payment_id: String },

    /// The gateway reported the payment attempt failed; the booking stays pending.
    Failed,
}

impl PaymentUpdate {
    #[must_use]
    pub const fn payment_state(&self) -> PaymentState {
        match self {
            Self::Paid { .. } => PaymentState::Paid,
            Self::Failed => PaymentState::Failed,
        }
    }

    /// Apply to an in-memory booking. Callers must have checked the precondition.
    pub fn apply(self, booking: &mut Booking, updated_at: Timestamp) {
        match self {
            Self::Paid { payment_id } => {
                booking.payment_state = PaymentState::Paid;
                booking.booking_state = BookingState::Confirmed;
                booking.gateway_payment_id.get_or_insert(payment_id);
            }
            Self::Failed => booking.payment_state = PaymentState::Failed,
        }

        booking.updated_at = updated_at;
    }
}
