use tracing::info;

use crate::{cli::CliError, shutdown};

use super::PurgeArgs;

pub(crate) async fn run(args: PurgeArgs) -> Result<(), CliError> {
    let handle = args.scheduler().await?.spawn();

    let signal = shutdown::requested().await;

    info!("stopping purge scheduler");

    handle.shutdown().await?;
    signal?;

    Ok(())
}
