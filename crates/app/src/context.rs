//! App Context

use std::{path::PathBuf, sync::Arc, time::Duration};

use rusty_money::iso;
use sanctum::{
    assets::AssetStore,
    booking::{
        BookingPaymentCoordinator, CheckoutSettings, ItemCatalog, PaymentGateway, StoreItems,
    },
    clock::{Clock, SystemClock},
    kinds::EntityKind,
    lifecycle::EntityLifecycleManager,
    purge::{PurgeScheduler, PurgeSettings},
};
use thiserror::Error;
use tracing::info;

use crate::{
    assets::FsAssetStore,
    database::{self, Db},
    gateway::{RazorpayConfig, RazorpayError, RazorpayGateway},
    stores::{PgBookingStore, PgRecordStore},
};

/// Kinds persisted as catalog records, in purge registration order.
pub const RECORD_KINDS: [EntityKind; 6] = [
    EntityKind::Category,
    EntityKind::Puja,
    EntityKind::Blog,
    EntityKind::Rudraksha,
    EntityKind::Bracelet,
    EntityKind::PujaBooking,
];

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to apply migrations")]
    Migrate(#[source] sqlx::migrate::MigrateError),

    #[error("failed to build payment gateway client")]
    Gateway(#[source] RazorpayError),

    #[error("`{0}` is not an ISO 4217 currency code")]
    UnknownCurrency(String),
}

/// Everything needed to build an [`AppContext`] against real infrastructure.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub razorpay: RazorpayConfig,
    pub checkout: CheckoutSettings,
    pub asset_root: PathBuf,
}

pub type RecordManager = EntityLifecycleManager<PgRecordStore>;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub db: Db,
    pub records: Vec<Arc<RecordManager>>,
    pub bookings: Arc<BookingPaymentCoordinator<PgBookingStore>>,
}

impl AppContext {
    /// Connect to the database and build the production context.
    ///
    /// # Errors
    ///
    /// Returns an error when the database is unreachable, the gateway client cannot be
    /// built, or the configured currency is unknown.
    pub async fn connect(settings: AppSettings) -> Result<Self, AppInitError> {
        let pool = database::connect(&settings.database_url, settings.max_connections)
            .await
            .map_err(AppInitError::Database)?;

        let gateway = RazorpayGateway::new(settings.razorpay).map_err(AppInitError::Gateway)?;

        let context = Self::from_parts(
            Db::new(pool),
            Arc::new(gateway),
            Arc::new(FsAssetStore::new(settings.asset_root)),
            Arc::new(SystemClock),
            settings.checkout,
        )?;

        info!(kinds = ?EntityKind::ALL, "application context ready");

        Ok(context)
    }

    /// Wire every entity kind to its store over an existing database handle.
    ///
    /// # Errors
    ///
    /// Returns [`AppInitError::UnknownCurrency`] for a currency outside ISO 4217.
    pub fn from_parts(
        db: Db,
        gateway: Arc<dyn PaymentGateway>,
        assets: Arc<dyn AssetStore>,
        clock: Arc<dyn Clock>,
        checkout: CheckoutSettings,
    ) -> Result<Self, AppInitError> {
        if iso::find(&checkout.currency).is_none() {
            return Err(AppInitError::UnknownCurrency(checkout.currency));
        }

        let records: Vec<Arc<RecordManager>> = RECORD_KINDS
            .into_iter()
            .map(|kind| {
                Arc::new(EntityLifecycleManager::new(
                    Arc::new(PgRecordStore::new(db.clone(), kind, Arc::clone(&clock))),
                    Arc::clone(&assets),
                    Arc::clone(&clock),
                ))
            })
            .collect();

        let items = |kind: EntityKind| {
            Arc::new(StoreItems(Arc::new(PgRecordStore::new(
                db.clone(),
                kind,
                Arc::clone(&clock),
            ))))
        };

        let catalog = ItemCatalog::new(
            items(EntityKind::Puja),
            items(EntityKind::Rudraksha),
            items(EntityKind::Bracelet),
        );

        let booking_lifecycle = EntityLifecycleManager::new(
            Arc::new(PgBookingStore::new(db.clone(), Arc::clone(&clock))),
            assets,
            clock,
        );

        let bookings = BookingPaymentCoordinator::new(
            booking_lifecycle,
            catalog,
            gateway,
            checkout,
        );

        Ok(Self {
            db,
            records,
            bookings: Arc::new(bookings),
        })
    }

    /// Lifecycle manager for a catalog record kind.
    #[must_use]
    pub fn record_manager(&self, kind: EntityKind) -> Option<&Arc<RecordManager>> {
        self.records.iter().find(|manager| manager.kind() == kind)
    }

    /// A scheduler purging every kind, with per-kind retention where overridden.
    #[must_use]
    pub fn purge_scheduler(
        &self,
        settings: PurgeSettings,
        overrides: &[(EntityKind, Duration)],
    ) -> PurgeScheduler {
        let retention_for = |kind: EntityKind| {
            overrides
                .iter()
                .rev()
                .find(|(overridden, _)| *overridden == kind)
                .map_or(settings.retention, |(_, retention)| *retention)
        };

        let mut scheduler = PurgeScheduler::new(settings);

        for manager in &self.records {
            scheduler.register_with_retention(manager.clone(), retention_for(manager.kind()));
        }

        let bookings = Arc::new(self.bookings.lifecycle().clone());
        scheduler.register_with_retention(bookings, retention_for(EntityKind::Booking));

        scheduler
    }
}
