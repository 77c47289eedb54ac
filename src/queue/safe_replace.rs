//! Safe-replace protocol (§4.6 upload phase): backup, upload, and roll back
//! on failure so the remote file is never left in a half-replaced state.

use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, classify, err};
use crate::ledger::{JobFacts, Ledger};
use crate::transfer::{RemoteClient, backup_remote, restore_remote};

pub struct SafeReplaceInput<'a> {
    pub remote_path: &'a str,
    pub local_encoded: &'a Path,
    pub local_backup: Option<&'a Path>,
    pub job_id: i64,
    pub codec_before: String,
    pub codec_after: String,
    pub original_size: u64,
    pub duration: f64,
}

pub struct SafeReplaceOutcome {
    pub compressed_size: u64,
    pub compression_ratio: f64,
}

/// Runs steps 2-4 of §4.6's safe-replace protocol against `client`. Step 1
/// (local original backup) is the caller's responsibility before invoking
/// this, since it only touches local disk and has no rollback concerns.
pub async fn safe_replace(
    client: &dyn RemoteClient,
    ledger: &Ledger,
    config: &PipelineConfig,
    input: SafeReplaceInput<'_>,
) -> anyhow::Result<SafeReplaceOutcome> {
    let compressed_size = std::fs::metadata(input.local_encoded)?.len();

    if config.advanced.block_larger_encoded && compressed_size >= input.original_size {
        return Err(err(ErrorKind::OutputLargerThanInput, "encoded larger than original"));
    }

    if config.advanced.create_backups {
        backup_remote(client, input.remote_path).await.map_err(|e| err(ErrorKind::BackupFailed, e.to_string()))?;
    }

    let upload_result = client.upload(input.local_encoded, input.remote_path, None).await;

    if let Err(upload_err) = upload_result {
        if config.advanced.create_backups {
            if let Err(rollback_err) = restore_remote(client, input.remote_path).await {
                return Err(err(
                    ErrorKind::RollbackFailed,
                    format!("upload failed ({upload_err}) and rollback failed ({rollback_err}): manual intervention required"),
                ));
            }
        }
        return Err(err(classify(&upload_err), format!("upload failed, rolled back: {upload_err}")));
    }

    if config.advanced.create_backups {
        let backup_path = backup_marker(input.remote_path);
        let _ = client.delete(&backup_path, false).await;
    }

    let compression_ratio = if input.original_size > 0 {
        1.0 - (compressed_size as f64 / input.original_size as f64)
    } else {
        0.0
    };

    ledger
        .record_completion(
            client,
            JobFacts {
                job_id: input.job_id,
                remote_path: input.remote_path.to_string(),
                codec_before: input.codec_before,
                codec_after: input.codec_after,
                original_size: input.original_size,
                compressed_size,
                compression_ratio,
                duration: input.duration,
                completed_at: chrono::Utc::now(),
            },
        )
        .await?;

    if !config.advanced.keep_encoded {
        let _ = std::fs::remove_file(input.local_encoded);
    }
    if !config.advanced.keep_original {
        if let Some(backup) = input.local_backup {
            let _ = std::fs::remove_file(backup);
        }
    }

    Ok(SafeReplaceOutcome { compressed_size, compression_ratio })
}

fn backup_marker(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.bak.{ext}"),
        _ => format!("{path}.bak"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transfer::MockClient;

    fn local_file(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoded.mkv");
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn successful_replace_backs_up_uploads_and_records_ledger() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"original bytes here").await;
        let ledger = Ledger::new("/ledger.json");
        let config = PipelineConfig::default();
        let (_dir, encoded) = local_file(b"small");

        let outcome = safe_replace(
            &client,
            &ledger,
            &config,
            SafeReplaceInput {
                remote_path: "/v/movie.mkv",
                local_encoded: &encoded,
                local_backup: None,
                job_id: 1,
                codec_before: "h264".into(),
                codec_after: "hevc".into(),
                original_size: 20,
                duration: 3600.0,
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.compressed_size, 5);
        assert!(client.exists("/v/movie.mkv").await.unwrap());
        assert!(!client.exists("/v/movie.bak.mkv").await.unwrap());
        assert_eq!(ledger.list_completed(&client).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blocks_when_encoded_is_not_smaller_than_original() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"original").await;
        let ledger = Ledger::new("/ledger.json");
        let config = PipelineConfig::default();
        let (_dir, encoded) = local_file(b"this encoded file is larger than original");

        let result = safe_replace(
            &client,
            &ledger,
            &config,
            SafeReplaceInput {
                remote_path: "/v/movie.mkv",
                local_encoded: &encoded,
                local_backup: None,
                job_id: 1,
                codec_before: "h264".into(),
                codec_after: "hevc".into(),
                original_size: 8,
                duration: 3600.0,
            },
        )
        .await;

        assert_eq!(crate::error::classify(&result.unwrap_err()), ErrorKind::OutputLargerThanInput);
        assert!(client.exists("/v/movie.mkv").await.unwrap());
    }

    #[tokio::test]
    async fn upload_failure_rolls_back_and_remote_is_intact() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"original bytes here").await;
        client.fail_next_upload(ErrorKind::NetworkTransient);
        let ledger = Ledger::new("/ledger.json");
        let config = PipelineConfig::default();
        let (_dir, encoded) = local_file(b"small");

        let result = safe_replace(
            &client,
            &ledger,
            &config,
            SafeReplaceInput {
                remote_path: "/v/movie.mkv",
                local_encoded: &encoded,
                local_backup: None,
                job_id: 1,
                codec_before: "h264".into(),
                codec_after: "hevc".into(),
                original_size: 20,
                duration: 3600.0,
            },
        )
        .await;

        assert_eq!(crate::error::classify(&result.unwrap_err()), ErrorKind::NetworkTransient);
        assert!(client.exists("/v/movie.mkv").await.unwrap());
        assert!(!client.exists("/v/movie.bak.mkv").await.unwrap());
    }

    #[tokio::test]
    async fn upload_failure_kind_propagates_rather_than_collapsing_to_a_fixed_value() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"original bytes here").await;
        client.fail_next_upload(ErrorKind::InsufficientSpace);
        let ledger = Ledger::new("/ledger.json");
        let config = PipelineConfig::default();
        let (_dir, encoded) = local_file(b"small");

        let result = safe_replace(
            &client,
            &ledger,
            &config,
            SafeReplaceInput {
                remote_path: "/v/movie.mkv",
                local_encoded: &encoded,
                local_backup: None,
                job_id: 1,
                codec_before: "h264".into(),
                codec_after: "hevc".into(),
                original_size: 20,
                duration: 3600.0,
            },
        )
        .await;

        assert_eq!(crate::error::classify(&result.unwrap_err()), ErrorKind::InsufficientSpace);
    }
}
