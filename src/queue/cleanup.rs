//! Cleanup policy (§4.6): completed jobs older than `cleanup_old_jobs_days`
//! are purged from the Job Store; Progress Ledger entries older than
//! `cleanup_old_progress_days` are purged from the ledger.

use crate::config::PipelineConfig;
use crate::job_store::JobStore;
use crate::ledger::Ledger;
use crate::transfer::RemoteClient;

pub struct CleanupReport {
    pub jobs_purged: usize,
    pub ledger_entries_purged: usize,
}

pub async fn run_cleanup(
    job_store: &JobStore,
    ledger: &Ledger,
    client: &dyn RemoteClient,
    config: &PipelineConfig,
) -> anyhow::Result<CleanupReport> {
    let jobs_purged = job_store.cleanup_older_than(config.advanced.cleanup_old_jobs_days)?;
    let ledger_entries_purged = ledger.purge_older_than(client, config.advanced.cleanup_old_progress_days).await?;
    Ok(CleanupReport { jobs_purged, ledger_entries_purged })
}
