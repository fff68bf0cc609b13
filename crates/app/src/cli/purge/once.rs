use sanctum::{kinds::EntityKind, purge::KindOutcome};

use crate::cli::CliError;

use super::PurgeArgs;

#[expect(
    clippy::print_stdout,
    reason = "the summary is the command's output, independent of log settings"
)]
pub(crate) async fn run(args: PurgeArgs) -> Result<(), CliError> {
    let summary = args.scheduler().await?.run_tick().await;

    for (kind, outcome) in &summary.outcomes {
        println!("{}", describe(*kind, outcome));
    }

    println!(
        "total: purged {}, {} kind(s) failed",
        summary.purged(),
        summary.failures()
    );

    Ok(())
}

fn describe(kind: EntityKind, outcome: &KindOutcome) -> String {
    match outcome {
        KindOutcome::Purged(report) => format!(
            "{kind}: purged {} of {} (already gone {}, skipped {}, store failures {}, \
             assets released {}, asset failures {})",
            report.purged,
            report.scanned,
            report.already_gone,
            report.skipped,
            report.store_failures,
            report.assets.released,
            report.assets.failed,
        ),
        KindOutcome::Failed(error) => format!("{kind}: failed: {error}"),
        KindOutcome::Panicked => format!("{kind}: purge task panicked"),
        KindOutcome::Cancelled => format!("{kind}: purge task was cancelled"),
    }
}
