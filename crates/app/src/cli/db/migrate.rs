use clap::Args;
use sanctum_app::{context::AppInitError, database};
use tracing::info;

use crate::{cli::CliError, config::db::DatabaseConfig};

#[derive(Debug, Args)]
pub(crate) struct MigrateArgs {
    #[command(flatten)]
    database: DatabaseConfig,
}

pub(crate) async fn run(args: MigrateArgs) -> Result<(), CliError> {
    let pool = database::connect(&args.database.database_url, args.database.max_connections)
        .await
        .map_err(AppInitError::Database)?;

    database::migrate(&pool)
        .await
        .map_err(AppInitError::Migrate)?;

    info!("migrations applied");

    pool.close().await;

    Ok(())
}
