//! Config Store (§4.1): one process-wide `PipelineConfig` behind a
//! `RwLock`, loaded as defaults deep-merged with a user override document,
//! persisted with the same `serde_json` read/write round trip the reference
//! job queue uses for its own JSON persistence. Every mutation publishes
//! `Event::ConfigChanged` on the shared event bus — that *is* `watch()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::CodecFamily;
use crate::event_bus::{Event, EventBus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDavEndpoint {
    pub url: String,
    pub username: String,
    pub password: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    Auto,
    Sftp,
    Webdav,
    PreferSftp,
    PreferWebdav,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub local_temp: PathBuf,
    pub local_backup: PathBuf,
    pub default_download_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    HevcNvenc,
    Libx265,
    Vp9Nvenc,
    LibvpxVp9,
}

impl VideoCodec {
    pub fn family(self) -> CodecFamily {
        match self {
            VideoCodec::HevcNvenc | VideoCodec::Libx265 => CodecFamily::Hevc,
            VideoCodec::Vp9Nvenc | VideoCodec::LibvpxVp9 => CodecFamily::Vp9,
        }
    }

    pub fn is_gpu(self) -> bool {
        matches!(self, VideoCodec::HevcNvenc | VideoCodec::Vp9Nvenc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Copy,
    Aac,
    Ac3,
    Opus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Main,
    Main10,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    pub video_codec: VideoCodec,
    pub gpu_enabled: bool,
    pub force_gpu: bool,
    pub gpu_limit: Option<u8>,
    pub encode_preset: String,
    pub cq: u8,
    pub rc_mode: String,
    pub bitrate: Option<String>,
    pub maxrate: Option<String>,
    pub lookahead: Option<u32>,
    pub bframes: Option<u32>,
    pub b_ref_mode: Option<String>,
    pub spatial_aq: bool,
    pub temporal_aq: bool,
    pub aq_strength: Option<u8>,
    pub multipass: Option<String>,
    pub profile: Profile,
    pub two_pass: bool,
    pub tune: Option<String>,
    pub cpu_preset: String,
    pub crf: u8,
    pub audio_codec: AudioCodec,
    pub audio_bitrate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    pub create_backups: bool,
    pub verify_checksums: bool,
    pub keep_original: bool,
    pub keep_encoded: bool,
    pub skip_already_target_codec: bool,
    pub pause_before_upload: bool,
    pub block_larger_encoded: bool,
    pub release_tag: String,
    pub log_level: String,
    pub retry_attempts: u32,
    pub connection_timeout_secs: u64,
    pub max_concurrent_downloads: usize,
    pub max_prefetch_files: usize,
    pub cleanup_old_jobs_days: u32,
    pub cleanup_old_progress_days: u32,
    /// Open Question decision (§9): capability downgrades are per-session
    /// only unless this is turned on, in which case a future collaborator
    /// may persist them through the Config Store.
    pub persist_capability_downgrade: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub remote: RemoteEndpoint,
    pub webdav: WebDavEndpoint,
    pub transfer_method: TransferMethod,
    pub storage: StorageConfig,
    pub ffmpeg: FfmpegConfig,
    pub advanced: AdvancedConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remote: RemoteEndpoint {
                host: String::new(),
                user: String::new(),
                password: String::new(),
                port: 22,
                path: "/".into(),
            },
            webdav: WebDavEndpoint {
                url: String::new(),
                username: String::new(),
                password: String::new(),
                path: "/".into(),
            },
            transfer_method: TransferMethod::Auto,
            storage: StorageConfig {
                local_temp: PathBuf::from("./data/temp"),
                local_backup: PathBuf::from("./data/backup"),
                default_download_path: PathBuf::from("./data/downloads"),
            },
            ffmpeg: FfmpegConfig {
                video_codec: VideoCodec::HevcNvenc,
                gpu_enabled: true,
                force_gpu: false,
                gpu_limit: None,
                encode_preset: "p5".into(),
                cq: 24,
                rc_mode: "vbr_hq".into(),
                bitrate: None,
                maxrate: None,
                lookahead: Some(20),
                bframes: Some(3),
                b_ref_mode: Some("middle".into()),
                spatial_aq: true,
                temporal_aq: true,
                aq_strength: Some(8),
                multipass: Some("qres".into()),
                profile: Profile::Main,
                two_pass: false,
                tune: None,
                cpu_preset: "medium".into(),
                crf: 24,
                audio_codec: AudioCodec::Copy,
                audio_bitrate: None,
            },
            advanced: AdvancedConfig {
                create_backups: true,
                verify_checksums: false,
                keep_original: false,
                keep_encoded: false,
                skip_already_target_codec: true,
                pause_before_upload: false,
                block_larger_encoded: true,
                release_tag: "Z3D".into(),
                log_level: "info".into(),
                retry_attempts: 3,
                connection_timeout_secs: 30,
                max_concurrent_downloads: 1,
                max_prefetch_files: 2,
                cleanup_old_jobs_days: 30,
                cleanup_old_progress_days: 90,
                persist_capability_downgrade: false,
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl PipelineConfig {
    /// Enforces the ranges and presence rules from §4.1. Never panics or
    /// propagates an `Err` — failures are reported in the result, matching
    /// "Failures are reported, never thrown".
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if matches!(
            self.transfer_method,
            TransferMethod::Sftp | TransferMethod::PreferSftp | TransferMethod::Auto
        ) && self.remote.host.is_empty()
        {
            errors.push("remote.host is required for the configured transfer method".into());
        }
        if matches!(
            self.transfer_method,
            TransferMethod::Webdav | TransferMethod::PreferWebdav | TransferMethod::Auto
        ) && self.webdav.url.is_empty()
        {
            errors.push("webdav.url is required for the configured transfer method".into());
        }

        if self.ffmpeg.cq > 51 {
            errors.push(format!("ffmpeg.cq must be 0-51, got {}", self.ffmpeg.cq));
        }
        if self.ffmpeg.crf > 51 {
            errors.push(format!("ffmpeg.crf must be 0-51, got {}", self.ffmpeg.crf));
        }
        const VALID_PRESETS: &[&str] = &["p1", "p2", "p3", "p4", "p5", "p6", "p7"];
        if self.ffmpeg.video_codec.is_gpu() && !VALID_PRESETS.contains(&self.ffmpeg.encode_preset.as_str())
        {
            errors.push(format!(
                "ffmpeg.encode_preset '{}' is not one of {:?}",
                self.ffmpeg.encode_preset, VALID_PRESETS
            ));
        }
        if let Some(limit) = self.ffmpeg.gpu_limit {
            if limit > 100 {
                errors.push(format!("ffmpeg.gpu_limit must be 0-100, got {}", limit));
            }
        }
        if self.advanced.retry_attempts == 0 {
            errors.push("advanced.retry_attempts must be non-negative and > 0".into());
        }

        ValidationResult { valid: errors.is_empty(), errors }
    }

    fn load_from_disk(path: &Path) -> anyhow::Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        if !path.exists() {
            return Ok(defaults);
        }
        let contents = std::fs::read_to_string(path)?;
        let overrides: serde_json::Value = serde_json::from_str(&contents)?;
        let mut merged = serde_json::to_value(&defaults)?;
        deep_merge(&mut merged, overrides);
        Ok(serde_json::from_value(merged)?)
    }

    fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Deep-merges `overrides` onto `base` in place, matching §4.1's "defaults
/// and user overrides, merged deeply".
fn deep_merge(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(override_map)) => {
            for (k, v) in override_map {
                deep_merge(base_map.entry(k).or_insert(serde_json::Value::Null), v);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Shared, reloadable configuration handle. Cheap to clone (`Arc` inside);
/// every component constructed with one sees the latest snapshot via
/// `snapshot()` and re-derives whatever it caches on `ConfigChanged`
/// (§9 "Replace singleton configuration with dependency injection").
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<PipelineConfig>>,
    path: Arc<PathBuf>,
    events: Arc<EventBus>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, events: Arc<EventBus>) -> anyhow::Result<Self> {
        let config = PipelineConfig::load_from_disk(&path)?;
        Ok(Self { inner: Arc::new(RwLock::new(config)), path: Arc::new(path), events })
    }

    pub async fn snapshot(&self) -> PipelineConfig {
        self.inner.read().await.clone()
    }

    /// `set`/`update` persist synchronously, then notify watchers with the
    /// full merged view (§4.1).
    pub async fn update(&self, patch: serde_json::Value) -> anyhow::Result<PipelineConfig> {
        let mut guard = self.inner.write().await;
        let mut merged = serde_json::to_value(&*guard)?;
        deep_merge(&mut merged, patch);
        let updated: PipelineConfig = serde_json::from_value(merged)?;
        updated.save_to_disk(&self.path)?;
        *guard = updated.clone();
        drop(guard);
        self.events.publish(Event::ConfigChanged);
        Ok(updated)
    }

    pub async fn reload(&self) -> anyhow::Result<PipelineConfig> {
        let reloaded = PipelineConfig::load_from_disk(&self.path)?;
        let mut guard = self.inner.write().await;
        *guard = reloaded.clone();
        drop(guard);
        self.events.publish(Event::ConfigChanged);
        Ok(reloaded)
    }

    pub async fn validate(&self) -> ValidationResult {
        self.inner.read().await.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        // Defaults intentionally omit endpoints, so only range/preset checks
        // should pass here; endpoint presence is exercised below.
        let mut with_endpoints = config.clone();
        with_endpoints.remote.host = "example.test".into();
        with_endpoints.webdav.url = "https://example.test/dav".into();
        let result = with_endpoints.validate();
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn rejects_out_of_range_cq() {
        let mut config = PipelineConfig::default();
        config.remote.host = "h".into();
        config.webdav.url = "https://h".into();
        config.ffmpeg.cq = 52;
        let result = config.validate();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("cq")));
    }

    #[test]
    fn missing_endpoint_is_reported_not_thrown() {
        let config = PipelineConfig::default();
        let result = config.validate();
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn update_persists_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let events = Arc::new(EventBus::new());
        let store = ConfigStore::new(path.clone(), events.clone()).unwrap();
        let mut sub = events.subscribe();

        store.update(serde_json::json!({"ffmpeg": {"cq": 30}})).await.unwrap();
        assert_eq!(store.snapshot().await.ffmpeg.cq, 30);
        assert!(path.exists());
        assert!(matches!(sub.recv().await, Some(Event::ConfigChanged)));
    }

    #[test]
    fn deep_merge_overrides_only_named_fields() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let overrides = serde_json::json!({"a": {"x": 99}});
        deep_merge(&mut base, overrides);
        assert_eq!(base["a"]["x"], 99);
        assert_eq!(base["a"]["y"], 2);
        assert_eq!(base["b"], 3);
    }
}
