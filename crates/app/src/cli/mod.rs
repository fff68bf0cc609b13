use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::{
    config::{ConfigError, observability::LoggingConfig},
    shutdown::ShutdownSignalError,
};

mod db;
mod purge;

#[derive(Debug, Parser)]
#[command(name = "sanctum", about = "Sanctum operator CLI", long_about = None)]
pub(crate) struct Cli {
    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Purge expired trash on a timer until interrupted
    ServePurger(purge::PurgeArgs),

    /// Run a single purge tick and print what it did
    PurgeOnce(purge::PurgeArgs),

    Db(db::DbCommand),
}

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialise application: {0}")]
    Init(#[from] sanctum_app::context::AppInitError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownSignalError),

    #[error("purge scheduler did not stop cleanly: {0}")]
    Scheduler(#[from] tokio::task::JoinError),
}

impl Cli {
    /// Load `.env` if present, then parse arguments and environment.
    pub(crate) fn load() -> Result<Self, clap::Error> {
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    pub(crate) async fn run(self) -> Result<(), CliError> {
        match self.command {
            Commands::ServePurger(args) => purge::serve(args).await,
            Commands::PurgeOnce(args) => purge::once(args).await,
            Commands::Db(command) => db::run(command).await,
        }
    }
}
