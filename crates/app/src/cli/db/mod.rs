use clap::{Args, Subcommand};

use super::CliError;

mod migrate;

#[derive(Debug, Args)]
pub(crate) struct DbCommand {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    /// Apply pending migrations
    Migrate(migrate::MigrateArgs),
}

pub(crate) async fn run(command: DbCommand) -> Result<(), CliError> {
    match command.command {
        DbSubcommand::Migrate(args) => migrate::run(args).await,
    }
}
