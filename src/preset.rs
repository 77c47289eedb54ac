//! Preset API (§ "Preset API"): named encoder-configuration presets, stored
//! remotely under `presets/ffmpeg_<name>.json` and mirrored locally so a
//! collaborator can work offline. Names are sanitised to `[A-Za-z0-9_-]+`
//! before touching either storage layer.

use serde::{Deserialize, Serialize};

use crate::domain::CodecFamily;
use crate::error::{ErrorKind, err};
use crate::transfer::RemoteClient;

const REMOTE_PREFIX: &str = "presets";

/// A named preset. `params` is left as a loose JSON value (§9 decision) so
/// unknown or future `FfmpegConfig` fields round-trip through save/load
/// without the preset schema having to change in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub codec_family: CodecFamily,
    pub params: serde_json::Value,
}

pub struct PresetStore {
    local_dir: std::path::PathBuf,
}

impl PresetStore {
    pub fn new(local_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { local_dir: local_dir.into() }
    }

    fn file_name(name: &str) -> String {
        format!("ffmpeg_{name}.json")
    }

    fn local_path(&self, name: &str) -> std::path::PathBuf {
        self.local_dir.join(Self::file_name(name))
    }

    fn remote_path(name: &str) -> String {
        format!("{REMOTE_PREFIX}/{}", Self::file_name(name))
    }

    /// Enforces the `[A-Za-z0-9_-]+` naming rule up front so a bad name
    /// never reaches either storage layer as a path fragment.
    pub fn sanitize_name(name: &str) -> anyhow::Result<()> {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            Ok(())
        } else {
            Err(err(ErrorKind::InvalidConfig, format!("preset name '{name}' must match [A-Za-z0-9_-]+")))
        }
    }

    /// Lists presets known locally — the remote store has no directory
    /// listing guarantee beyond what `RemoteClient::list` already gives us,
    /// so `list` surfaces the local cache and `pull` is how a caller
    /// refreshes it from the remote `presets/` prefix.
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.local_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.local_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_prefix("ffmpeg_").and_then(|s| s.strip_suffix(".json")) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn save(&self, preset: &Preset) -> anyhow::Result<()> {
        Self::sanitize_name(&preset.name)?;
        std::fs::create_dir_all(&self.local_dir)?;
        let bytes = serde_json::to_vec_pretty(preset)?;
        std::fs::write(self.local_path(&preset.name), bytes)?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> anyhow::Result<Preset> {
        Self::sanitize_name(name)?;
        let path = self.local_path(name);
        if !path.exists() {
            return Err(err(ErrorKind::NotFound, format!("preset '{name}' not found")));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn delete(&self, name: &str) -> anyhow::Result<()> {
        Self::sanitize_name(name)?;
        let path = self.local_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Uploads the locally saved preset to `presets/ffmpeg_<name>.json`.
    pub async fn push(&self, client: &dyn RemoteClient, name: &str) -> anyhow::Result<()> {
        Self::sanitize_name(name)?;
        let preset = self.load(name)?;
        let bytes = serde_json::to_vec_pretty(&preset)?;
        client.mkdirs(REMOTE_PREFIX).await?;
        client.write_file(&Self::remote_path(name), &bytes).await
    }

    /// Downloads a preset from the remote store and saves it locally,
    /// overwriting any local copy with the same name.
    pub async fn pull(&self, client: &dyn RemoteClient, name: &str) -> anyhow::Result<Preset> {
        Self::sanitize_name(name)?;
        let bytes = client.read_file(&Self::remote_path(name)).await?;
        let preset: Preset = serde_json::from_slice(&bytes)?;
        self.save(&preset)?;
        Ok(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::MockClient;

    fn sample(name: &str) -> Preset {
        Preset {
            name: name.to_string(),
            codec_family: CodecFamily::Hevc,
            params: serde_json::json!({"cq": 24, "preset": "p7"}),
        }
    }

    #[test]
    fn rejects_names_outside_allowed_charset() {
        assert!(PresetStore::sanitize_name("my preset").is_err());
        assert!(PresetStore::sanitize_name("ok_Name-1").is_ok());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save(&sample("archival")).unwrap();
        let loaded = store.load("archival").unwrap();
        assert_eq!(loaded.params["cq"], 24);
        assert_eq!(store.list().unwrap(), vec!["archival".to_string()]);
    }

    #[test]
    fn delete_removes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save(&sample("temp")).unwrap();
        store.delete("temp").unwrap();
        assert!(store.load("temp").is_err());
    }

    #[tokio::test]
    async fn push_then_pull_round_trips_through_remote() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save(&sample("archival")).unwrap();
        let client = MockClient::new();

        store.push(&client, "archival").await.unwrap();
        store.delete("archival").unwrap();
        assert!(store.load("archival").is_err());

        let pulled = store.pull(&client, "archival").await.unwrap();
        assert_eq!(pulled.name, "archival");
        assert_eq!(store.load("archival").unwrap().params["preset"], "p7");
    }
}
