//! SFTP implementation of `RemoteClient` (§4.3), built on `ssh2` sessions
//! the same way the SSH-management reference tool builds them: resolve the
//! address, `TcpStream::connect_timeout`, `Session::handshake`, then
//! password or key-based auth. `ssh2` is synchronous, so every call goes
//! through `tokio::task::spawn_blocking`.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::{Entry, EntryKind, ProgressCallback, ProgressTracker, RemoteClient};
use crate::config::RemoteEndpoint;
use crate::error::{ErrorKind, err};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct SessionHandle {
    session: ssh2::Session,
}

// `ssh2::Session` is not `Sync`; every access happens from inside
// `spawn_blocking` under the outer `Mutex`, so this is sound the same way
// the reference tool guards its session behind a worker-owned `Option`.
unsafe impl Send for SessionHandle {}

pub struct SftpClient {
    endpoint: RemoteEndpoint,
    session: Mutex<Option<SessionHandle>>,
}

impl SftpClient {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint, session: Mutex::new(None) }
    }

    fn connect_blocking(endpoint: &RemoteEndpoint) -> anyhow::Result<ssh2::Session> {
        let addr_str = format!("{}:{}", endpoint.host, endpoint.port);
        let mut addrs = addr_str
            .to_socket_addrs()
            .map_err(|e| err(ErrorKind::NetworkFatal, format!("resolving {addr_str}: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| err(ErrorKind::NetworkFatal, format!("no address for {addr_str}")))?;
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| err(ErrorKind::NetworkTransient, format!("connecting to {addr_str}: {e}")))?;
        let _ = tcp.set_read_timeout(Some(Duration::from_secs(30)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(30)));

        let mut session = ssh2::Session::new()
            .map_err(|e| err(ErrorKind::NetworkFatal, format!("creating ssh session: {e}")))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| err(ErrorKind::NetworkTransient, format!("ssh handshake with {addr_str}: {e}")))?;

        session
            .userauth_password(&endpoint.user, &endpoint.password)
            .map_err(|e| err(ErrorKind::AuthFailed, format!("password auth for {}: {e}", endpoint.user)))?;
        if !session.authenticated() {
            return Err(err(ErrorKind::AuthFailed, format!("authentication rejected for {}", endpoint.user)));
        }
        Ok(session)
    }

    /// Returns a cloned, connected session; rebuilds after a connection-class
    /// error, never retries silently after an auth failure (§4.3).
    async fn with_sftp<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&ssh2::Sftp) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.connect().await?;
        let endpoint = self.endpoint.clone_for_blocking();
        let existing = self.session.lock().unwrap().take();
        let (result, handle) = tokio::task::spawn_blocking(move || -> (anyhow::Result<T>, Option<SessionHandle>) {
            let handle = match existing {
                Some(h) => h,
                None => match SftpClient::connect_blocking(&endpoint) {
                    Ok(session) => SessionHandle { session },
                    Err(e) => return (Err(e), None),
                },
            };
            let sftp = match handle.session.sftp() {
                Ok(sftp) => sftp,
                Err(e) => return (Err(err(ErrorKind::NetworkTransient, format!("opening sftp channel: {e}"))), None),
            };
            let result = f(&sftp);
            let keep = result.is_ok()
                || !matches!(
                    result.as_ref().map_err(crate::error::classify),
                    Err(ErrorKind::NetworkTransient | ErrorKind::NetworkFatal)
                );
            (result, keep.then_some(handle))
        })
        .await
        .map_err(|e| err(ErrorKind::NetworkFatal, format!("sftp worker task panicked: {e}")))?;
        *self.session.lock().unwrap() = handle;
        result
    }
}

impl RemoteEndpoint {
    fn clone_for_blocking(&self) -> RemoteEndpoint {
        self.clone()
    }
}

fn stat_to_entry(path: &str, stat: &ssh2::FileStat) -> Entry {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    Entry {
        name: name.clone(),
        path: path.to_string(),
        kind: if stat.is_dir() { EntryKind::Directory } else { EntryKind::File },
        size: stat.size.unwrap_or(0),
        modified_at: stat.mtime.map(|t| Utc.timestamp_opt(t as i64, 0).single()).flatten(),
        is_hidden: !Entry::hidden_filter(&name),
    }
}

#[async_trait]
impl RemoteClient for SftpClient {
    async fn connect(&self) -> anyhow::Result<()> {
        if self.session.lock().unwrap().is_some() {
            return Ok(());
        }
        let endpoint = self.endpoint.clone_for_blocking();
        let session = tokio::task::spawn_blocking(move || SftpClient::connect_blocking(&endpoint))
            .await
            .map_err(|e| err(ErrorKind::NetworkFatal, format!("connect task panicked: {e}")))??;
        *self.session.lock().unwrap() = Some(SessionHandle { session });
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>> {
        let path = path.to_string();
        self.with_sftp(move |sftp| {
            let mut entries = Vec::new();
            for (entry_path, stat) in sftp.readdir(std::path::Path::new(&path))? {
                let name = entry_path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
                if !Entry::hidden_filter(&name) {
                    continue;
                }
                let full = format!("{}/{}", path.trim_end_matches('/'), name);
                entries.push(stat_to_entry(&full, &stat));
            }
            Ok(entries)
        })
        .await
    }

    async fn stat(&self, path: &str) -> anyhow::Result<Option<Entry>> {
        let owned = path.to_string();
        self.with_sftp(move |sftp| match sftp.stat(std::path::Path::new(&owned)) {
            Ok(stat) => Ok(Some(stat_to_entry(&owned, &stat))),
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(None),
            Err(e) => Err(err(ErrorKind::NetworkTransient, format!("stat {owned}: {e}"))),
        })
        .await
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
        let remote = remote.to_string();
        let local = local.to_path_buf();
        let resume_from = if local.exists() { std::fs::metadata(&local)?.len() } else { 0 };

        let bytes = self
            .with_sftp(move |sftp| {
                let mut file = sftp
                    .open(std::path::Path::new(&remote))
                    .map_err(|e| err(ErrorKind::NetworkTransient, format!("opening {remote}: {e}")))?;
                if resume_from > 0 {
                    file.seek(resume_from);
                }
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Ok(buf)
            })
            .await?;

        let mut out = std::fs::OpenOptions::new()
            .create(true)
            .append(resume_from > 0)
            .write(true)
            .truncate(resume_from == 0)
            .open(&local)?;
        out.write_all(&bytes)?;

        if let Some(cb) = on_progress {
            let total = resume_from + bytes.len() as u64;
            let mut tracker = ProgressTracker::new(total);
            if let Some(p) = tracker.record(total) {
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
        let part_for_write = part.clone();
        let bytes_for_write = bytes.clone();
        self.with_sftp(move |sftp| {
            let mut file = sftp
                .create(std::path::Path::new(&part_for_write))
                .map_err(|e| err(ErrorKind::NetworkTransient, format!("creating {part_for_write}: {e}")))?;
            file.write_all(&bytes_for_write)?;
            Ok(())
        })
        .await?;

        if let Some(cb) = on_progress {
            let mut tracker = ProgressTracker::new(bytes.len() as u64);
            if let Some(p) = tracker.record(bytes.len() as u64) {
                cb(p);
            }
        }

        self.rename(&part, remote).await
    }

    async fn rename(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        let src = src.to_string();
        let dst = dst.to_string();
        self.with_sftp(move |sftp| {
            sftp.rename(std::path::Path::new(&src), std::path::Path::new(&dst), None)
                .map_err(|e| err(ErrorKind::NetworkTransient, format!("renaming {src} -> {dst}: {e}")))
        })
        .await
    }

    async fn delete(&self, path: &str, recursive: bool) -> anyhow::Result<()> {
        let owned = path.to_string();
        self.with_sftp(move |sftp| {
            if recursive {
                for (entry_path, stat) in sftp.readdir(std::path::Path::new(&owned))? {
                    if stat.is_dir() {
                        sftp.rmdir(&entry_path)?;
                    } else {
                        sftp.unlink(&entry_path)?;
                    }
                }
                sftp.rmdir(std::path::Path::new(&owned)).or_else(|_| Ok::<_, ssh2::Error>(()))?;
            } else {
                sftp.unlink(std::path::Path::new(&owned))?;
            }
            Ok(())
        })
        .await
    }

    async fn mkdirs(&self, path: &str) -> anyhow::Result<()> {
        let owned = path.to_string();
        self.with_sftp(move |sftp| {
            let mut accum = String::new();
            for segment in owned.split('/').filter(|s| !s.is_empty()) {
                accum.push('/');
                accum.push_str(segment);
                match sftp.stat(std::path::Path::new(&accum)) {
                    Ok(_) => continue,
                    Err(_) => {
                        let _ = sftp.mkdir(std::path::Path::new(&accum), 0o755);
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let owned = path.to_string();
        self.with_sftp(move |sftp| {
            let mut file = sftp
                .open(std::path::Path::new(&owned))
                .map_err(|e| err(ErrorKind::NotFound, format!("{owned}: {e}")))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        })
        .await
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let owned = path.to_string();
        let bytes = bytes.to_vec();
        self.with_sftp(move |sftp| {
            let mut file = sftp
                .create(std::path::Path::new(&owned))
                .map_err(|e| err(ErrorKind::NetworkTransient, format!("creating {owned}: {e}")))?;
            file.write_all(&bytes)?;
            Ok(())
        })
        .await
    }
}
