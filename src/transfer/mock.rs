//! In-memory `RemoteClient` test double (§8), modeled on the SSH reference
//! tool's `MockSftp` stand-in: enough state to assert rename/delete/rollback
//! behavior without touching a network or filesystem.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{Entry, EntryKind, ProgressCallback, RemoteClient};
use crate::error::{ErrorKind, err};

struct Inner {
    files: BTreeMap<String, Vec<u8>>,
    connected: bool,
    fail_next_download: Option<ErrorKind>,
    fail_next_upload: Option<ErrorKind>,
    renames: Vec<(String, String)>,
    deletes: Vec<String>,
}

/// Records every rename/delete it performs so rollback-protocol tests can
/// assert exactly what happened, not just the end state.
pub struct MockClient {
    inner: Mutex<Inner>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                files: BTreeMap::new(),
                connected: false,
                fail_next_download: None,
                fail_next_upload: None,
                renames: Vec::new(),
                deletes: Vec::new(),
            }),
        }
    }

    pub async fn seed_file(&self, path: &str, bytes: &[u8]) {
        self.inner.lock().unwrap().files.insert(path.to_string(), bytes.to_vec());
    }

    pub fn fail_next_download(&self, kind: ErrorKind) {
        self.inner.lock().unwrap().fail_next_download = Some(kind);
    }

    pub fn fail_next_upload(&self, kind: ErrorKind) {
        self.inner.lock().unwrap().fail_next_upload = Some(kind);
    }

    pub fn renames(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().renames.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.inner.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl RemoteClient for MockClient {
    async fn connect(&self) -> anyhow::Result<()> {
        self.inner.lock().unwrap().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.inner.lock().unwrap().connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>> {
        let prefix = if path.ends_with('/') { path.to_string() } else { format!("{path}/") };
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .filter_map(|k| {
                let name = k.strip_prefix(&prefix)?;
                if name.contains('/') || !Entry::hidden_filter(name) {
                    return None;
                }
                Some(Entry {
                    name: name.to_string(),
                    path: k.clone(),
                    kind: EntryKind::File,
                    size: guard.files[k].len() as u64,
                    modified_at: Some(Utc::now()),
                    is_hidden: false,
                })
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<Entry>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.files.get(path).map(|bytes| Entry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            kind: EntryKind::File,
            size: bytes.len() as u64,
            modified_at: Some(Utc::now()),
            is_hidden: false,
        }))
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().files.contains_key(path))
    }

    async fn download(
        &self,
        remote: &str,
        local: &std::path::Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        if let Some(kind) = self.inner.lock().unwrap().fail_next_download.take() {
            return Err(err(kind, "mock download failure"));
        }
        let bytes = self
            .inner
            .lock()
            .unwrap()
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| err(ErrorKind::NotFound, format!("{remote} not found")))?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local, &bytes)?;
        if let Some(cb) = on_progress {
            cb(super::TransferProgress {
                percent: 100.0,
                transferred: bytes.len() as u64,
                total: bytes.len() as u64,
                speed_bytes_per_sec: 0.0,
                eta_secs: Some(0),
                elapsed_secs: 0.0,
            });
        }
        Ok(())
    }

    async fn upload(
        &self,
        local: &std::path::Path,
        remote: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        if let Some(kind) = self.inner.lock().unwrap().fail_next_upload.take() {
            return Err(err(kind, "mock upload failure"));
        }
        let bytes = std::fs::read(local)?;
        let part = super::part_path(remote);
        {
            let mut guard = self.inner.lock().unwrap();
            guard.files.insert(part.clone(), bytes.clone());
        }
        self.rename(&part, remote).await?;
        if let Some(cb) = on_progress {
            cb(super::TransferProgress {
                percent: 100.0,
                transferred: bytes.len() as u64,
                total: bytes.len() as u64,
                speed_bytes_per_sec: 0.0,
                eta_secs: Some(0),
                elapsed_secs: 0.0,
            });
        }
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let bytes = guard
            .files
            .remove(src)
            .ok_or_else(|| err(ErrorKind::NotFound, format!("{src} not found")))?;
        guard.files.insert(dst.to_string(), bytes);
        guard.renames.push((src.to_string(), dst.to_string()));
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if recursive {
            let prefix = format!("{path}/");
            let to_remove: Vec<String> =
                guard.files.keys().filter(|k| *k == path || k.starts_with(&prefix)).cloned().collect();
            for k in &to_remove {
                guard.files.remove(k);
            }
            guard.deletes.extend(to_remove);
        } else {
            guard.files.remove(path);
            guard.deletes.push(path.to_string());
        }
        Ok(())
    }

    async fn mkdirs(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| err(ErrorKind::NotFound, format!("{path} not found")))
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.inner.lock().unwrap().files.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_lands_at_part_path_then_renames() {
        let client = MockClient::new();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("out.mkv");
        std::fs::write(&local, b"encoded bytes").unwrap();

        client.upload(&local, "/v/out.mkv", None).await.unwrap();
        assert!(client.exists("/v/out.mkv").await.unwrap());
        assert_eq!(client.renames(), vec![("/v/out.mkv.part".to_string(), "/v/out.mkv".to_string())]);
    }

    #[tokio::test]
    async fn list_filters_hidden_entries() {
        let client = MockClient::new();
        client.seed_file("/v/movie.mkv", b"x").await;
        client.seed_file("/v/.hidden.mkv", b"x").await;
        let entries = client.list("/v").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "movie.mkv");
    }
}
