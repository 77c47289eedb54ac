//! WebDAV implementation of `RemoteClient` (§4.3), built on
//! `reqwest_dav::Client` the same way the reference `webdav` module builds
//! it: a `ClientBuilder` with `set_host`/`set_auth(Auth::Basic(..))`.

use async_trait::async_trait;
use reqwest_dav::{Client as DavClient, ClientBuilder, types::Auth, types::Depth};

use super::{Entry, EntryKind, ProgressCallback, ProgressTracker, RemoteClient};
use crate::config::WebDavEndpoint;
use crate::error::{ErrorKind, err};

pub struct WebDavClient {
    client: DavClient,
}

impl WebDavClient {
    pub fn new(endpoint: &WebDavEndpoint) -> anyhow::Result<Self> {
        let auth = Auth::Basic(endpoint.username.clone(), endpoint.password.clone());
        let client = ClientBuilder::new()
            .set_host(endpoint.url.trim_end_matches('/').to_string())
            .set_auth(auth)
            .build()
            .map_err(|e| err(ErrorKind::InvalidConfig, format!("building webdav client: {e:?}")))?;
        Ok(Self { client })
    }

    fn classify_dav_error(e: &reqwest_dav::Error) -> ErrorKind {
        let msg = format!("{e:?}").to_lowercase();
        if msg.contains("401") || msg.contains("403") || msg.contains("unauthorized") {
            ErrorKind::AuthFailed
        } else if msg.contains("404") || msg.contains("not found") {
            ErrorKind::NotFound
        } else if msg.contains("timeout") || msg.contains("connection") || msg.contains("reset") {
            ErrorKind::NetworkTransient
        } else {
            ErrorKind::NetworkFatal
        }
    }
}

#[async_trait]
impl RemoteClient for WebDavClient {
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>> {
        let items = self
            .client
            .list(path, Depth::Number(1))
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("listing {path}: {e:?}")))?;

        let mut entries = Vec::new();
        for item in items {
            let (href, kind, size, modified) = match &item {
                reqwest_dav::types::list_cmd::ListEntity::File(f) => {
                    (&f.href, EntryKind::File, f.content_length as u64, Some(f.last_modified))
                }
                reqwest_dav::types::list_cmd::ListEntity::Folder(f) => (&f.href, EntryKind::Directory, 0, None),
            };
            if href.trim_end_matches('/') == path.trim_end_matches('/') {
                continue;
            }
            let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string();
            if !Entry::hidden_filter(&name) {
                continue;
            }
            entries.push(Entry {
                name,
                path: href.clone(),
                kind,
                size,
                modified_at: modified,
                is_hidden: false,
            });
        }
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<Entry>> {
        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("/");
        let name = path.rsplit('/').next().unwrap_or(path);
        match self.list(parent).await {
            Ok(entries) => Ok(entries.into_iter().find(|e| e.name == name)),
            Err(_) => Ok(None),
        }
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    async fn download(
        &self,
        remote: &str,
        local: &std::path::Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .get(remote)
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("downloading {remote}: {e:?}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| err(ErrorKind::NetworkTransient, format!("reading response body for {remote}: {e}")))?;

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local, &bytes)?;

        if let Some(cb) = on_progress {
            let mut tracker = ProgressTracker::new(bytes.len() as u64);
            if let Some(p) = tracker.record(bytes.len() as u64) {
                cb(p);
            }
        }
        Ok(())
    }

    async fn upload(
        &self,
        local: &std::path::Path,
        remote: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        let bytes = std::fs::read(local)?;
        let part = super::part_path(remote);

        self.client
            .put(&part, bytes.clone())
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("uploading {part}: {e:?}")))?;

        if let Some(cb) = on_progress {
            let mut tracker = ProgressTracker::new(bytes.len() as u64);
            if let Some(p) = tracker.record(bytes.len() as u64) {
                cb(p);
            }
        }

        self.rename(&part, remote).await
    }

    async fn rename(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        self.client
            .mv(src, dst)
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("renaming {src} -> {dst}: {e:?}")))
    }

    async fn delete(&self, path: &str, _recursive: bool) -> anyhow::Result<()> {
        self.client
            .delete(path)
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("deleting {path}: {e:?}")))
    }

    async fn mkdirs(&self, path: &str) -> anyhow::Result<()> {
        let mut accum = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            accum.push('/');
            accum.push_str(segment);
            let _ = self.client.mkcol(&accum).await;
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(path)
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("reading {path}: {e:?}")))?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.client
            .put(path, bytes.to_vec())
            .await
            .map_err(|e| err(Self::classify_dav_error(&e), format!("writing {path}: {e:?}")))
    }
}

/// Video container extensions the pipeline admits from a WebDAV listing
/// (§6, the reference `list_videos`'s extension filter generalized beyond
/// `.mp4`/`.mkv`/`.mov`/`.avi`/`.webm`).
pub fn is_video_file(name: &str) -> bool {
    const EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];
    name.rsplit_once('.').is_some_and(|(_, ext)| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_common_video_extensions() {
        assert!(is_video_file("movie.MKV"));
        assert!(is_video_file("clip.mp4"));
        assert!(!is_video_file("notes.txt"));
    }
}
