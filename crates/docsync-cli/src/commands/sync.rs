use anyhow::Result;
use docsync::{SnapshotConfig, SyncOptions, SyncOrchestrator};

use super::format;

/// Run one sync and print the per-source report to stdout.
pub async fn run(
    orchestrator: &SyncOrchestrator,
    snapshot: &SnapshotConfig,
    options: SyncOptions,
) -> Result<()> {
    if options.push {
        println!("Syncing into {}@{}...", snapshot.repo, snapshot.branch);
    } else {
        println!("Syncing (no push)...");
    }

    let run = orchestrator.run_sync(snapshot, options).await?;
    format::print_run_report(&run);

    if !run.success {
        anyhow::bail!(
            "sync finished with {} failed source(s){}",
            run.summary.failed,
            match &run.push {
                Some(push) if !push.success => " and a failed push",
                _ => "",
            }
        );
    }
    Ok(())
}
