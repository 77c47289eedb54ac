//! Remote Transfer Layer (§4.3): a polymorphic `RemoteClient` capability
//! with two implementors (SFTP, WebDAV) and a `TransferFacade` that selects
//! between them per configured transfer method.

mod backup;
mod facade;
mod mock;
mod progress;
mod retry;
mod sftp;
mod webdav;

pub use backup::{backup_remote, restore_remote};
pub use facade::TransferFacade;
pub use mock::MockClient;
pub use progress::{ProgressTracker, TransferProgress};
pub use retry::retry_with_backoff;
pub use sftp::SftpClient;
pub use webdav::WebDavClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One directory listing row or `stat()` result (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub is_hidden: bool,
}

impl Entry {
    pub fn hidden_filter(name: &str) -> bool {
        !name.starts_with('.')
    }
}

pub type ProgressCallback<'a> = dyn Fn(TransferProgress) + Send + Sync + 'a;

/// Capability every remote transport implements (§4.3). All operations are
/// async because both implementors ultimately do network I/O — SFTP's
/// synchronous `ssh2` calls run inside `tokio::task::spawn_blocking`.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self) -> anyhow::Result<()>;
    async fn is_connected(&self) -> bool;

    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>>;
    async fn stat(&self, path: &str) -> anyhow::Result<Option<Entry>>;
    async fn exists(&self, path: &str) -> anyhow::Result<bool>;

    async fn download(
        &self,
        remote: &str,
        local: &std::path::Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()>;

    async fn upload(
        &self,
        local: &std::path::Path,
        remote: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()>;

    async fn rename(&self, src: &str, dst: &str) -> anyhow::Result<()>;
    async fn delete(&self, path: &str, recursive: bool) -> anyhow::Result<()>;
    async fn mkdirs(&self, path: &str) -> anyhow::Result<()>;

    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>>;
    async fn write_file(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

pub fn part_path(remote: &str) -> String {
    format!("{remote}.part")
}

/// `testConnection()` (§6 Transfer API): connects and reports whether the
/// session came up, without leaving a lasting side effect beyond whatever
/// `connect()` itself does.
pub async fn test_connection(client: &dyn RemoteClient) -> anyhow::Result<bool> {
    client.connect().await?;
    Ok(client.is_connected().await)
}

/// `scanRecursive(path)` (§6 Transfer API): walks every subdirectory under
/// `path` and returns every entry found, files and directories alike.
pub async fn scan_recursive(client: &dyn RemoteClient, path: &str) -> anyhow::Result<Vec<Entry>> {
    let mut found = Vec::new();
    let mut stack = vec![path.to_string()];
    while let Some(dir) = stack.pop() {
        let entries = client.list(&dir).await?;
        for entry in &entries {
            if entry.kind == EntryKind::Directory {
                stack.push(entry.path.clone());
            }
        }
        found.extend(entries);
    }
    Ok(found)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteFolderStats {
    pub file_count: u64,
    pub total_size: u64,
}

/// `getFolderStats(path, includeDuration?)` (§6 Transfer API). Duration is
/// deliberately left unsummed here: it would mean probing every matched
/// file over the network one at a time, which the Cache API's local index
/// is built to avoid; callers after per-file duration should probe through
/// the Encoder once a file is already local.
pub async fn get_folder_stats(client: &dyn RemoteClient, path: &str) -> anyhow::Result<RemoteFolderStats> {
    let entries = scan_recursive(client, path).await?;
    let mut stats = RemoteFolderStats::default();
    for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
        stats.file_count += 1;
        stats.total_size += entry.size;
    }
    Ok(stats)
}

/// `downloadToDefault(path, isDir)` (§6 Transfer API): downloads a single
/// file, or every file under a directory, into `default_download_dir`,
/// mirroring the remote's relative layout for directory downloads.
pub async fn download_to_default(
    client: &dyn RemoteClient,
    remote_path: &str,
    is_dir: bool,
    default_download_dir: &std::path::Path,
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if !is_dir {
        let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        let local_path = default_download_dir.join(file_name);
        client.download(remote_path, &local_path, None).await?;
        return Ok(vec![local_path]);
    }

    let mut downloaded = Vec::new();
    for entry in scan_recursive(client, remote_path).await? {
        if entry.kind != EntryKind::File {
            continue;
        }
        let relative = entry.path.strip_prefix(remote_path).unwrap_or(&entry.path).trim_start_matches('/');
        let local_path = default_download_dir.join(relative);
        client.download(&entry.path, &local_path, None).await?;
        downloaded.push(local_path);
    }
    Ok(downloaded)
}
