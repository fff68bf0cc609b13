use clap::Args;
use sanctum::purge::PurgeScheduler;
use sanctum_app::context::AppContext;

use crate::config::{AppConfig, purge::PurgeConfig};

use super::CliError;

mod once;
mod serve;

pub(crate) use once::run as once;
pub(crate) use serve::run as serve;

#[derive(Debug, Args)]
pub(crate) struct PurgeArgs {
    #[command(flatten)]
    app: AppConfig,

    /// Trash purging settings.
    #[command(flatten)]
    purge: PurgeConfig,
}

impl PurgeArgs {
    async fn scheduler(self) -> Result<PurgeScheduler, CliError> {
        let (settings, overrides) = self.purge.settings()?;
        let context = AppContext::connect(self.app.into_settings()).await?;

        Ok(context.purge_scheduler(settings, &overrides))
    }
}
