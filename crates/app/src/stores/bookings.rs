//! Bookings Store

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sanctum::{
    booking::{
        BookerDetails, Booking, BookingState, BookingStore, ItemRef, PaymentState, PaymentUpdate,
    },
    clock::Clock,
    ids::{BookingUuid, RecordUuid},
    kinds::{EntityKind, ItemKind},
    lifecycle::{
        DeletePrecondition, Lifecycle, LifecycleState, LifecycleStore, StoreError, WriteError,
    },
};
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, types::Json};

use crate::{
    database::Db,
    stores::errors::{decode_error, store_error},
};

const FIND_BOOKING_SQL: &str = include_str!("sql/bookings/find.sql");
const LOCK_BOOKING_SQL: &str = include_str!("sql/bookings/lock.sql");
const LIST_ACTIVE_BOOKINGS_SQL: &str = include_str!("sql/bookings/list_active.sql");
const LIST_TRASHED_BOOKINGS_SQL: &str = include_str!("sql/bookings/list_trashed.sql");
const INSERT_BOOKING_SQL: &str = include_str!("sql/bookings/insert.sql");
const SET_BOOKING_TRASHED_AT_SQL: &str = include_str!("sql/bookings/set_trashed_at.sql");
const SET_BOOKING_STATES_SQL: &str = include_str!("sql/bookings/set_states.sql");
const DELETE_BOOKING_SQL: &str = include_str!("sql/bookings/delete.sql");

#[derive(Debug, Clone)]
pub struct PgBookingStore {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl PgBookingStore {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn now(&self) -> SqlxTimestamp {
        SqlxTimestamp::from(self.clock.now())
    }

    async fn lock<S: Debug>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: BookingUuid,
    ) -> Result<Booking, WriteError<S>> {
        query_as::<Postgres, BookingRow>(LOCK_BOOKING_SQL)
            .bind(uuid.into_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?
            .map(BookingRow::into_inner)
            .ok_or(WriteError::NotFound)
    }

    /// Persist the payment and booking states of an already locked booking.
    async fn save_states<S: Debug>(
        &self,
        mut tx: Transaction<'_, Postgres>,
        booking: &Booking,
    ) -> Result<Booking, WriteError<S>> {
        let saved = query_as::<Postgres, BookingRow>(SET_BOOKING_STATES_SQL)
            .bind(booking.uuid.into_uuid())
            .bind(booking.payment_state.as_str())
            .bind(booking.booking_state.as_str())
            .bind(booking.gateway_payment_id.as_deref())
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(saved.into_inner())
    }
}

#[async_trait]
impl LifecycleStore for PgBookingStore {
    type Entity = Booking;

    fn kind(&self) -> EntityKind {
        EntityKind::Booking
    }

    async fn find(&self, uuid: BookingUuid) -> Result<Option<Booking>, StoreError> {
        let row = query_as::<Postgres, BookingRow>(FIND_BOOKING_SQL)
            .bind(uuid.into_uuid())
            .fetch_optional(self.db.pool())
            .await
            .map_err(store_error)?;

        Ok(row.map(BookingRow::into_inner))
    }

    async fn find_by_state(
        &self,
        state: LifecycleState,
        trashed_before: Option<Timestamp>,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = match (state, trashed_before) {
            (LifecycleState::Active, Some(_)) => return Ok(Vec::new()),
            (LifecycleState::Active, None) => {
                query_as::<Postgres, BookingRow>(LIST_ACTIVE_BOOKINGS_SQL)
                    .fetch_all(self.db.pool())
                    .await
            }
            (LifecycleState::Trashed, cutoff) => {
                query_as::<Postgres, BookingRow>(LIST_TRASHED_BOOKINGS_SQL)
                    .bind(cutoff.map(SqlxTimestamp::from))
                    .fetch_all(self.db.pool())
                    .await
            }
        }
        .map_err(store_error)?;

        Ok(rows.into_iter().map(BookingRow::into_inner).collect())
    }

    async fn transition(
        &self,
        uuid: BookingUuid,
        expected: LifecycleState,
        next: Lifecycle,
    ) -> Result<Booking, WriteError<LifecycleState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let current = self.lock::<LifecycleState>(&mut tx, uuid).await?.lifecycle.state();

        if current != expected {
            return Err(WriteError::Conflict { current });
        }

        let updated = query_as::<Postgres, BookingRow>(SET_BOOKING_TRASHED_AT_SQL)
            .bind(uuid.into_uuid())
            .bind(next.trashed_at().map(SqlxTimestamp::from))
            .bind(self.now())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(updated.into_inner())
    }

    async fn delete(
        &self,
        uuid: BookingUuid,
        precondition: DeletePrecondition,
    ) -> Result<Booking, WriteError<LifecycleState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let snapshot = self.lock::<LifecycleState>(&mut tx, uuid).await?;

        if !precondition.admits(snapshot.lifecycle) {
            return Err(WriteError::Conflict {
                current: snapshot.lifecycle.state(),
            });
        }

        query(DELETE_BOOKING_SQL)
            .bind(uuid.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(snapshot)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let amount = i64::try_from(booking.amount).map_err(StoreError::backend)?;

        query(INSERT_BOOKING_SQL)
            .bind(booking.uuid.into_uuid())
            .bind(booking.item.kind.as_str())
            .bind(booking.item.uuid.into_uuid())
            .bind(amount)
            .bind(&booking.currency)
            .bind(Json(&booking.booker))
            .bind(booking.payment_state.as_str())
            .bind(booking.booking_state.as_str())
            .bind(&booking.gateway_order_id)
            .bind(booking.gateway_payment_id.as_deref())
            .bind(booking.lifecycle.trashed_at().map(SqlxTimestamp::from))
            .bind(SqlxTimestamp::from(booking.created_at))
            .bind(SqlxTimestamp::from(booking.updated_at))
            .execute(self.db.pool())
            .await
            .map_err(store_error)?;

        Ok(())
    }

    async fn update_payment(
        &self,
        uuid: BookingUuid,
        expected: PaymentState,
        update: PaymentUpdate,
    ) -> Result<Booking, WriteError<PaymentState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let mut booking = self.lock::<PaymentState>(&mut tx, uuid).await?;

        if booking.payment_state != expected {
            return Err(WriteError::Conflict {
                current: booking.payment_state,
            });
        }

        update.apply(&mut booking, self.clock.now());

        self.save_states(tx, &booking).await
    }

    async fn cancel(&self, uuid: BookingUuid) -> Result<Booking, WriteError<BookingState>> {
        let mut tx = self.db.begin().await.map_err(store_error)?;

        let mut booking = self.lock::<BookingState>(&mut tx, uuid).await?;

        if booking.booking_state != BookingState::Pending {
            return Err(WriteError::Conflict {
                current: booking.booking_state,
            });
        }

        booking.booking_state = BookingState::Cancelled;

        self.save_states(tx, &booking).await
    }
}

struct BookingRow(Booking);

impl BookingRow {
    fn into_inner(self) -> Booking {
        self.0
    }
}

impl<'r> FromRow<'r, PgRow> for BookingRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let item_kind: String = row.try_get("item_kind")?;
        let amount: i64 = row.try_get("amount")?;
        let payment_state: String = row.try_get("payment_state")?;
        let booking_state: String = row.try_get("booking_state")?;
        let Json(booker) = row.try_get::<Json<BookerDetails>, _>("booker")?;

        Ok(Self(Booking {
            uuid: BookingUuid::from_uuid(row.try_get("uuid")?),
            item: ItemRef {
                kind: item_kind
                    .parse::<ItemKind>()
                    .map_err(|source| decode_error("item_kind", source))?,
                uuid: RecordUuid::from_uuid(row.try_get("item_uuid")?),
            },
            amount: u64::try_from(amount).map_err(|source| decode_error("amount", source))?,
            currency: row.try_get("currency")?,
            booker,
            payment_state: payment_state
                .parse()
                .map_err(|source| decode_error("payment_state", source))?,
            booking_state: booking_state
                .parse()
                .map_err(|source| decode_error("booking_state", source))?,
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            lifecycle: Lifecycle::from_trashed_at(
                row.try_get::<Option<SqlxTimestamp>, _>("trashed_at")?
                    .map(SqlxTimestamp::to_jiff),
            ),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::test::TestContext;

    use super::*;

    fn pending_booking(ctx: &TestContext, order_id: &str) -> Booking {
        let now = ctx.clock.now();

        Booking {
            uuid: BookingUuid::new(),
            item: ItemRef {
                kind: ItemKind::Puja,
                uuid: RecordUuid::new(),
            },
            amount: 51_000,
            currency: "INR".to_string(),
            booker: BookerDetails {
                name: "Ravi".to_string(),
                email: "ravi@example.com".to_string(),
                phone: "+91 90000 00000".to_string(),
                note: Some("Evening slot".to_string()),
            },
            payment_state: PaymentState::Pending,
            booking_state: BookingState::Pending,
            gateway_order_id: order_id.to_string(),
            gateway_payment_id: None,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() -> TestResult {
        let ctx = TestContext::new().await;
        let booking = pending_booking(&ctx, "order_round_trip");

        ctx.bookings.insert(&booking).await?;

        let found = ctx
            .bookings
            .find(booking.uuid)
            .await?
            .ok_or("booking not found")?;

        assert_eq!(found, booking);

        Ok(())
    }

    #[tokio::test]
    async fn payment_update_is_conditional_on_expected_state() -> TestResult {
        let ctx = TestContext::new().await;
        let booking = pending_booking(&ctx, "order_conditional");
        ctx.bookings.insert(&booking).await?;

        ctx.clock.advance(SignedDuration::from_secs(30))?;

        let paid = ctx
            .bookings
            .update_payment(
                booking.uuid,
                PaymentState::Pending,
                PaymentUpdate::Paid {
                    payment_id: "pay_1".to_string(),
                },
            )
            .await?;

        assert_eq!(paid.payment_state, PaymentState::Paid);
        assert_eq!(paid.booking_state, BookingState::Confirmed);
        assert_eq!(paid.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(paid.updated_at, ctx.clock.now());

        let again = ctx
            .bookings
            .update_payment(
                booking.uuid,
                PaymentState::Pending,
                PaymentUpdate::Paid {
                    payment_id: "pay_2".to_string(),
                },
            )
            .await;

        assert!(
            matches!(
                again,
                Err(WriteError::Conflict {
                    current: PaymentState::Paid
                })
            ),
            "expected Conflict, got {again:?}"
        );

        let stored = ctx
            .bookings
            .find(booking.uuid)
            .await?
            .ok_or("booking not found")?;

        assert_eq!(stored.gateway_payment_id.as_deref(), Some("pay_1"));

        Ok(())
    }

    #[tokio::test]
    async fn cancel_only_applies_to_pending_bookings() -> TestResult {
        let ctx = TestContext::new().await;
        let booking = pending_booking(&ctx, "order_cancel");
        ctx.bookings.insert(&booking).await?;

        let cancelled = ctx.bookings.cancel(booking.uuid).await?;
        let again = ctx.bookings.cancel(booking.uuid).await;

        assert_eq!(cancelled.booking_state, BookingState::Cancelled);
        assert!(
            matches!(
                again,
                Err(WriteError::Conflict {
                    current: BookingState::Cancelled
                })
            ),
            "expected Conflict, got {again:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_gateway_order_is_rejected() -> TestResult {
        let ctx = TestContext::new().await;

        ctx.bookings
            .insert(&pending_booking(&ctx, "order_dup"))
            .await?;
        let duplicate = ctx
            .bookings
            .insert(&pending_booking(&ctx, "order_dup"))
            .await;

        assert!(
            matches!(duplicate, Err(StoreError::AlreadyExists)),
            "expected AlreadyExists, got {duplicate:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn trashed_bookings_are_listed_by_cutoff() -> TestResult {
        let ctx = TestContext::new().await;
        let booking = pending_booking(&ctx, "order_trash");
        ctx.bookings.insert(&booking).await?;

        let trashed_at = ctx.clock.now();
        ctx.bookings
            .transition(
                booking.uuid,
                LifecycleState::Active,
                Lifecycle::Trashed { at: trashed_at },
            )
            .await?;

        let before = ctx
            .bookings
            .find_by_state(
                LifecycleState::Trashed,
                Some(trashed_at - SignedDuration::from_secs(1)),
            )
            .await?;
        let after = ctx
            .bookings
            .find_by_state(LifecycleState::Trashed, Some(trashed_at))
            .await?;

        assert!(before.is_empty());
        assert_eq!(after.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn delete_requires_trash_at_or_before_cutoff() -> TestResult {
        let ctx = TestContext::new().await;
        let booking = pending_booking(&ctx, "order_delete");
        ctx.bookings.insert(&booking).await?;

        let active = ctx
            .bookings
            .delete(
                booking.uuid,
                DeletePrecondition::TrashedAtOrBefore(ctx.clock.now()),
            )
            .await;

        assert!(
            matches!(
                active,
                Err(WriteError::Conflict {
                    current: LifecycleState::Active
                })
            ),
            "expected Conflict, got {active:?}"
        );

        let trashed_at = ctx.clock.now();
        ctx.bookings
            .transition(
                booking.uuid,
                LifecycleState::Active,
                Lifecycle::Trashed { at: trashed_at },
            )
            .await?;

        let too_recent = ctx
            .bookings
            .delete(
                booking.uuid,
                DeletePrecondition::TrashedAtOrBefore(trashed_at - SignedDuration::from_secs(1)),
            )
            .await;

        assert!(
            matches!(
                too_recent,
                Err(WriteError::Conflict {
                    current: LifecycleState::Trashed
                })
            ),
            "expected Conflict, got {too_recent:?}"
        );
        assert!(ctx.bookings.find(booking.uuid).await?.is_some());

        let removed = ctx
            .bookings
            .delete(booking.uuid, DeletePrecondition::TrashedAtOrBefore(trashed_at))
            .await?;

        assert_eq!(removed.uuid, booking.uuid);
        assert_eq!(removed.lifecycle, Lifecycle::Trashed { at: trashed_at });
        assert!(ctx.bookings.find(booking.uuid).await?.is_none());

        let again = ctx
            .bookings
            .delete(booking.uuid, DeletePrecondition::Any)
            .await;

        assert!(
            matches!(again, Err(WriteError::NotFound)),
            "expected NotFound, got {again:?}"
        );

        Ok(())
    }
}
