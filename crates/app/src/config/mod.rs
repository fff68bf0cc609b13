//! Operator configuration

use clap::Args;
use sanctum_app::context::AppSettings;
use thiserror::Error;

use crate::config::{assets::AssetsConfig, db::DatabaseConfig, gateway::GatewayConfig};

pub(crate) mod assets;
pub(crate) mod db;
pub(crate) mod gateway;
pub(crate) mod observability;
pub(crate) mod purge;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("purge interval must be at least one second")]
    ZeroPurgeInterval,

    #[error("retention of {0} days is too large")]
    RetentionOutOfRange(u64),
}

/// Everything the application context needs.
#[derive(Debug, Args)]
pub(crate) struct AppConfig {
    /// Application database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Payment gateway settings.
    #[command(flatten)]
    pub gateway: GatewayConfig,

    /// Uploaded file storage settings.
    #[command(flatten)]
    pub assets: AssetsConfig,
}

impl AppConfig {
    pub(crate) fn into_settings(self) -> AppSettings {
        let (razorpay, checkout) = self.gateway.into_parts();

        AppSettings {
            database_url: self.database.database_url,
            max_connections: self.database.max_connections,
            razorpay,
            checkout,
            asset_root: self.assets.assets_root,
        }
    }
}
