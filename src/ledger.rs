//! Progress Ledger (§4.4): a single JSON document at a well-known remote
//! path, written atomically (temp name, then rename) the same way the
//! safe-replace protocol uploads land at `.part` before being renamed into
//! place. Corruption never silently drops history — the bad file is
//! archived under a versioned name and a fresh ledger takes its place.
//! Entries are keyed by `remote_path` (§4.4): a job deleted and re-admitted
//! for the same remote file replaces its old entry rather than appending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transfer::RemoteClient;

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFacts {
    pub job_id: i64,
    pub remote_path: String,
    pub codec_before: String,
    pub codec_after: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub duration: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerMeta {
    version: u32,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerDocument {
    meta: LedgerMeta,
    jobs: Vec<JobFacts>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self { meta: LedgerMeta { version: LEDGER_VERSION, updated_at: Utc::now() }, jobs: Vec::new() }
    }
}

pub struct Ledger {
    path: String,
}

impl Ledger {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the ledger, archiving and reinitialising on parse failure
    /// rather than ever silently dropping history (§4.4).
    pub async fn load(&self, client: &dyn RemoteClient) -> anyhow::Result<Vec<JobFacts>> {
        if !client.exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let bytes = client.read_file(&self.path).await?;
        match serde_json::from_slice::<LedgerDocument>(&bytes) {
            Ok(doc) => Ok(doc.jobs),
            Err(e) => {
                tracing::error!(error = %e, path = %self.path, "progress ledger corrupted, archiving and reinitialising");
                let archive_path = format!("{}.corrupt.{}", self.path, Utc::now().timestamp());
                client.write_file(&archive_path, &bytes).await?;
                self.write_document(client, &LedgerDocument::default()).await?;
                Ok(Vec::new())
            }
        }
    }

    pub async fn list_completed(&self, client: &dyn RemoteClient) -> anyhow::Result<Vec<JobFacts>> {
        self.load(client).await
    }

    pub async fn record_completion(&self, client: &dyn RemoteClient, facts: JobFacts) -> anyhow::Result<()> {
        let mut jobs = self.load(client).await?;
        jobs.retain(|j| j.remote_path != facts.remote_path);
        jobs.push(facts);
        let doc = LedgerDocument { meta: LedgerMeta { version: LEDGER_VERSION, updated_at: Utc::now() }, jobs };
        self.write_document(client, &doc).await
    }

    async fn write_document(&self, client: &dyn RemoteClient, doc: &LedgerDocument) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp_path = format!("{}.tmp", self.path);
        client.write_file(&tmp_path, &bytes).await?;
        client.rename(&tmp_path, &self.path).await
    }

    /// Purges entries older than `days` (§4.1 `advanced.cleanup_old_progress_days`).
    pub async fn purge_older_than(&self, client: &dyn RemoteClient, days: u32) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let jobs = self.load(client).await?;
        let (keep, drop): (Vec<_>, Vec<_>) = jobs.into_iter().partition(|j| j.completed_at >= cutoff);
        if drop.is_empty() {
            return Ok(0);
        }
        let doc = LedgerDocument { meta: LedgerMeta { version: LEDGER_VERSION, updated_at: Utc::now() }, jobs: keep };
        self.write_document(client, &doc).await?;
        Ok(drop.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MockClient;

    fn sample_facts(job_id: i64) -> JobFacts {
        JobFacts {
            job_id,
            remote_path: format!("/videos/{job_id}.mkv"),
            codec_before: "h264".into(),
            codec_after: "hevc".into(),
            original_size: 1_000_000,
            compressed_size: 500_000,
            compression_ratio: 0.5,
            duration: 120.0,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn load_of_missing_ledger_is_empty() {
        let client = MockClient::new();
        let ledger = Ledger::new("/ledger.json");
        assert!(ledger.load(&client).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_then_list_round_trips() {
        let client = MockClient::new();
        let ledger = Ledger::new("/ledger.json");
        ledger.record_completion(&client, sample_facts(1)).await.unwrap();
        ledger.record_completion(&client, sample_facts(2)).await.unwrap();

        let jobs = ledger.list_completed(&client).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(client.exists("/ledger.json").await.unwrap());
        assert!(!client.exists("/ledger.json.tmp").await.unwrap());
    }

    #[tokio::test]
    async fn recording_same_remote_path_replaces_entry() {
        let client = MockClient::new();
        let ledger = Ledger::new("/ledger.json");
        ledger.record_completion(&client, sample_facts(1)).await.unwrap();
        let mut updated = sample_facts(1);
        updated.compressed_size = 100;
        ledger.record_completion(&client, updated).await.unwrap();

        let jobs = ledger.list_completed(&client).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].compressed_size, 100);
    }

    #[tokio::test]
    async fn a_re_admitted_job_for_the_same_remote_path_replaces_the_old_entry() {
        let client = MockClient::new();
        let ledger = Ledger::new("/ledger.json");
        ledger.record_completion(&client, sample_facts(1)).await.unwrap();

        let mut re_admitted = sample_facts(2);
        re_admitted.remote_path = sample_facts(1).remote_path;
        re_admitted.compressed_size = 42;
        ledger.record_completion(&client, re_admitted).await.unwrap();

        let jobs = ledger.list_completed(&client).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, 2);
        assert_eq!(jobs[0].compressed_size, 42);
    }

    #[tokio::test]
    async fn corrupted_ledger_is_archived_and_reinitialised() {
        let client = MockClient::new();
        client.seed_file("/ledger.json", b"not json").await;
        let ledger = Ledger::new("/ledger.json");

        let jobs = ledger.load(&client).await.unwrap();
        assert!(jobs.is_empty());

        let listing = client.list("/").await.unwrap();
        assert!(listing.iter().any(|e| e.name.starts_with("ledger.json.corrupt.")));
    }
}
