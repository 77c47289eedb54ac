//! `TransferFacade` (§4.3): selects between the SFTP and WebDAV
//! implementors per the configured transfer method, remembering a capability
//! downgrade for the rest of the process (§9 Open Question decision — not
//! persisted across restarts).

use std::sync::RwLock;

use async_trait::async_trait;

use super::{ProgressCallback, RemoteClient, retry_with_backoff};
use crate::config::TransferMethod;
use crate::error::{ErrorKind, classify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Sftp,
    Webdav,
}

pub struct TransferFacade {
    sftp: Box<dyn RemoteClient>,
    webdav: Box<dyn RemoteClient>,
    configured: TransferMethod,
    retry_attempts: u32,
    /// Remembered for this process's lifetime only (§9 decision 1).
    downgraded_to: RwLock<Option<Method>>,
}

impl TransferFacade {
    pub fn new(sftp: Box<dyn RemoteClient>, webdav: Box<dyn RemoteClient>, configured: TransferMethod, retry_attempts: u32) -> Self {
        Self { sftp, webdav, configured, retry_attempts, downgraded_to: RwLock::new(None) }
    }

    fn client_for(&self, method: Method) -> &dyn RemoteClient {
        match method {
            Method::Sftp => self.sftp.as_ref(),
            Method::Webdav => self.webdav.as_ref(),
        }
    }

    fn other(method: Method) -> Method {
        match method {
            Method::Sftp => Method::Webdav,
            Method::Webdav => Method::Sftp,
        }
    }

    /// Read path prefers the read-optimised method (WebDAV) under `auto`;
    /// write path prefers the write-reliable method (SFTP) under `auto`
    /// (§4.3).
    fn primary_for(&self, for_write: bool) -> Method {
        if let Some(forced) = *self.downgraded_to.read().unwrap() {
            return forced;
        }
        match self.configured {
            TransferMethod::Sftp => Method::Sftp,
            TransferMethod::Webdav => Method::Webdav,
            TransferMethod::PreferSftp => Method::Sftp,
            TransferMethod::PreferWebdav => Method::Webdav,
            TransferMethod::Auto => {
                if for_write {
                    Method::Sftp
                } else {
                    Method::Webdav
                }
            }
        }
    }

    fn allows_fallback(&self) -> bool {
        !matches!(self.configured, TransferMethod::Sftp | TransferMethod::Webdav)
    }

    async fn with_fallback<T, F>(&self, for_write: bool, op: F) -> anyhow::Result<T>
    where
        F: for<'a> Fn(&'a dyn RemoteClient) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<T>> + Send + 'a>>,
    {
        let primary = self.primary_for(for_write);
        let attempts = self.retry_attempts;
        let result = retry_with_backoff(attempts, || op(self.client_for(primary))).await;

        match result {
            Ok(value) => Ok(value),
            Err(e) if self.allows_fallback() && is_capability_failure(&e) => {
                tracing::warn!(error = %e, "transfer method failed, downgrading capability for remainder of process");
                let fallback = Self::other(primary);
                *self.downgraded_to.write().unwrap() = Some(fallback);
                retry_with_backoff(attempts, || op(self.client_for(fallback))).await
            }
            Err(e) => Err(e),
        }
    }
}

fn is_capability_failure(e: &anyhow::Error) -> bool {
    matches!(classify(e), ErrorKind::AuthFailed | ErrorKind::NetworkFatal | ErrorKind::ProtocolCapabilityMissing)
}

#[async_trait]
impl RemoteClient for TransferFacade {
    async fn connect(&self) -> anyhow::Result<()> {
        self.client_for(self.primary_for(false)).connect().await
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.sftp.disconnect().await?;
        self.webdav.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        self.client_for(self.primary_for(false)).is_connected().await
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<super::Entry>> {
        let path = path.to_string();
        self.with_fallback(false, move |client| {
            let path = path.clone();
            Box::pin(async move { client.list(&path).await })
        })
        .await
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<super::Entry>> {
        let path = path.to_string();
        self.with_fallback(false, move |client| {
            let path = path.clone();
            Box::pin(async move { client.stat(&path).await })
        })
        .await
    }

    async fn exists(&self, path: &str) -> anyhow::Result<bool> {
        let path = path.to_string();
        self.with_fallback(false, move |client| {
            let path = path.clone();
            Box::pin(async move { client.exists(&path).await })
        })
        .await
    }

    async fn download(
        &self,
        remote: &str,
        local: &std::path::Path,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        self.with_fallback(false, move |client| Box::pin(async move { client.download(remote, local, on_progress).await }))
            .await
    }

    async fn upload(
        &self,
        local: &std::path::Path,
        remote: &str,
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> anyhow::Result<()> {
        self.with_fallback(true, move |client| Box::pin(async move { client.upload(local, remote, on_progress).await }))
            .await
    }

    async fn rename(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        let (src, dst) = (src.to_string(), dst.to_string());
        self.with_fallback(true, move |client| {
            let (src, dst) = (src.clone(), dst.clone());
            Box::pin(async move { client.rename(&src, &dst).await })
        })
        .await
    }

    async fn delete(&self, path: &str, recursive: bool) -> anyhow::Result<()> {
        let path = path.to_string();
        self.with_fallback(true, move |client| {
            let path = path.clone();
            Box::pin(async move { client.delete(&path, recursive).await })
        })
        .await
    }

    async fn mkdirs(&self, path: &str) -> anyhow::Result<()> {
        let path = path.to_string();
        self.with_fallback(true, move |client| {
            let path = path.clone();
            Box::pin(async move { client.mkdirs(&path).await })
        })
        .await
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let path = path.to_string();
        self.with_fallback(false, move |client| {
            let path = path.clone();
            Box::pin(async move { client.read_file(&path).await })
        })
        .await
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let (path, bytes) = (path.to_string(), bytes.to_vec());
        self.with_fallback(true, move |client| {
            let (path, bytes) = (path.clone(), bytes.clone());
            Box::pin(async move { client.write_file(&path, &bytes).await })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MockClient;

    #[tokio::test]
    async fn forced_sftp_never_falls_back() {
        let sftp = MockClient::new();
        sftp.fail_next_upload(ErrorKind::AuthFailed);
        let webdav = MockClient::new();
        let facade = TransferFacade::new(Box::new(sftp), Box::new(webdav), TransferMethod::Sftp, 1);

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("f.mkv");
        std::fs::write(&local, b"x").unwrap();
        let result = facade.upload(&local, "/v/f.mkv", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn auto_falls_back_and_remembers_downgrade() {
        let sftp = MockClient::new();
        sftp.fail_next_upload(ErrorKind::AuthFailed);
        let webdav = MockClient::new();
        let facade = TransferFacade::new(Box::new(sftp), Box::new(webdav), TransferMethod::Auto, 1);

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("f.mkv");
        std::fs::write(&local, b"x").unwrap();

        facade.upload(&local, "/v/f.mkv", None).await.unwrap();
        assert_eq!(*facade.downgraded_to.read().unwrap(), Some(Method::Webdav));
    }
}
