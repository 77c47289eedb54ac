//! Encode/probe process wrapper (§4.5): spawns `ffmpeg`/`ffprobe`, parses
//! progress off stdout the way the reference worker's `process_job` does,
//! manages the `encoding_state` crash-recovery sentinel, and verifies the
//! output codec after a successful encode.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{InputInfo, args::build_args};
use crate::config::PipelineConfig;
use crate::domain::{CodecFamily, EncodeMode, JobProgress};
use crate::error::{ErrorKind, err};

const PROGRESS_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SentinelFile {
    target: String,
}

fn sentinel_path(output: &Path) -> PathBuf {
    output.with_extension(format!("{}.encoding_state", output.extension().and_then(|e| e.to_str()).unwrap_or("")))
}

pub struct EncodeOutcome {
    pub codec_verified: bool,
}

pub struct Encoder;

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Runs `ffprobe` for duration, codec, resolution, bitrate, and
    /// audio/subtitle stream counts (§4.5), mirroring the reference
    /// `get_video_duration`/`get_video_dimensions` flag choices.
    pub async fn probe_input(&self, path: &Path) -> anyhow::Result<InputInfo> {
        let duration = probe_duration(path).await?;
        let (width, height) = probe_dimensions(path).await?;
        let codec_name = probe_video_codec(path).await?;
        let (audio_track_count, audio_codec) = probe_audio(path).await?;
        let subtitle_track_count = probe_subtitle_count(path).await?;
        let bitrate = probe_bitrate(path).await;

        Ok(InputInfo {
            duration_secs: duration,
            codec_name,
            width,
            height,
            bitrate,
            audio_track_count,
            audio_codec,
            subtitle_track_count,
        })
    }

    /// Encodes `input` to `output`. Writes the crash-recovery sentinel
    /// before spawning, clears it on success, and re-probes the output to
    /// confirm the target codec family (§4.5 Verification).
    pub async fn encode<F>(
        &self,
        input: &Path,
        output: &Path,
        family: CodecFamily,
        mode: EncodeMode,
        config: &PipelineConfig,
        input_info: &InputInfo,
        mut on_progress: F,
    ) -> anyhow::Result<EncodeOutcome>
    where
        F: FnMut(JobProgress) + Send,
    {
        let sentinel = sentinel_path(output);
        std::fs::write(
            &sentinel,
            serde_json::to_vec(&SentinelFile { target: output.to_string_lossy().into_owned() })?,
        )?;

        let mut args = build_args(family, mode, config, input_info);
        args.insert(1, "pipe:1".into());
        args.insert(1, "-progress".into());
        args.insert(1, input.to_string_lossy().into_owned());
        args.insert(1, "-i".into());
        args.push(output.to_string_lossy().into_owned());

        let mut child = tokio::process::Command::new("ffmpeg")
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| err(ErrorKind::EncoderUnavailable, format!("spawning ffmpeg: {e}")))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let duration = input_info.duration_secs;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "ffmpeg", "{line}");
                tail = line;
            }
            tail
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut current_out_time_secs: Option<f64> = None;
        let mut current_speed: Option<f64> = None;
        let mut current_fps: Option<f64> = None;
        let mut last_emit = Instant::now() - PROGRESS_MIN_INTERVAL;

        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(value) = line.strip_prefix("fps=") {
                current_fps = value.trim().parse().ok();
            } else if let Some(value) = line.strip_prefix("out_time_ms=") {
                current_out_time_secs = value.trim().parse::<f64>().ok().map(|us| us / 1_000_000.0);
            } else if let Some(value) = line.strip_prefix("out_time=") {
                current_out_time_secs = current_out_time_secs.or_else(|| parse_ffmpeg_timestamp(value.trim()));
            } else if let Some(value) = line.strip_prefix("speed=") {
                current_speed = value.trim().trim_end_matches('x').parse().ok();
            } else if line.starts_with("progress=") {
                if last_emit.elapsed() >= PROGRESS_MIN_INTERVAL {
                    let percent = if duration > 0.0 {
                        ((current_out_time_secs.unwrap_or(0.0) / duration) * 100.0).clamp(0.0, 100.0) as f32
                    } else {
                        0.0
                    };
                    let eta = current_speed
                        .filter(|s| *s > 0.0)
                        .and_then(|speed| {
                            let remaining = duration - current_out_time_secs.unwrap_or(0.0);
                            (remaining > 0.0).then_some((remaining / speed) as u64)
                        });
                    on_progress(JobProgress {
                        percent,
                        fps: current_fps,
                        speed: current_speed,
                        eta,
                    });
                    last_emit = Instant::now();
                }
                if line == "progress=end" {
                    break;
                }
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let _ = std::fs::remove_file(&sentinel);
            return Err(err(ErrorKind::EncoderFailed, format!("ffmpeg exited with {status}: {stderr_tail}")));
        }

        let verified = match self.probe_input(output).await {
            Ok(output_info) => output_info.codec_name.eq_ignore_ascii_case(family.probe_codec_name()),
            Err(_) => false,
        };

        let _ = std::fs::remove_file(&sentinel);

        if !verified {
            return Err(err(ErrorKind::EncoderFailed, "encoded output does not match target codec family"));
        }

        Ok(EncodeOutcome { codec_verified: verified })
    }

    /// Crash recovery (§4.5): any `encoding_state` sentinel is a ghost from a
    /// prior crash. Its partial target and the sentinel itself are both
    /// deleted; callers then return the owning job to `ready_encode`/`waiting`.
    pub fn cleanup_ghost_sentinels(&self, dir: &Path) -> anyhow::Result<usize> {
        let mut removed = 0;
        if !dir.exists() {
            return Ok(0);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("encoding_state") {
                if let Ok(bytes) = std::fs::read(&path) {
                    if let Ok(sentinel) = serde_json::from_slice::<SentinelFile>(&bytes) {
                        let target = path.parent().unwrap_or_else(|| Path::new(".")).join(&sentinel.target);
                        let _ = std::fs::remove_file(&target);
                    }
                }
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn parse_ffmpeg_timestamp(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

async fn run_ffprobe(args: &[&str]) -> anyhow::Result<String> {
    let output = tokio::process::Command::new("ffprobe")
        .args(args)
        .output()
        .await
        .map_err(|e| err(ErrorKind::EncoderUnavailable, format!("spawning ffprobe: {e}")))?;
    if !output.status.success() {
        return Err(err(ErrorKind::EncoderFailed, format!("ffprobe exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn probe_duration(path: &Path) -> anyhow::Result<f64> {
    let path = path.to_string_lossy().into_owned();
    let out = run_ffprobe(&[
        "-v", "error", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1", &path,
    ])
    .await?;
    out.parse().map_err(|_| err(ErrorKind::EncoderFailed, format!("unparseable duration: {out}")))
}

async fn probe_dimensions(path: &Path) -> anyhow::Result<(u32, u32)> {
    let path = path.to_string_lossy().into_owned();
    let out = run_ffprobe(&[
        "-v", "error", "-select_streams", "v:0", "-show_entries", "stream=width,height", "-of", "csv=s=x:p=0", &path,
    ])
    .await?;
    let (w, h) = out.split_once('x').ok_or_else(|| err(ErrorKind::EncoderFailed, format!("unparseable dimensions: {out}")))?;
    Ok((w.trim().parse()?, h.trim().parse()?))
}

async fn probe_video_codec(path: &Path) -> anyhow::Result<String> {
    let path = path.to_string_lossy().into_owned();
    run_ffprobe(&[
        "-v", "error", "-select_streams", "v:0", "-show_entries", "stream=codec_name", "-of",
        "default=noprint_wrappers=1:nokey=1", &path,
    ])
    .await
}

async fn probe_audio(path: &Path) -> anyhow::Result<(u32, Option<String>)> {
    let path_str = path.to_string_lossy().into_owned();
    let out = run_ffprobe(&[
        "-v", "error", "-select_streams", "a", "-show_entries", "stream=codec_name", "-of",
        "default=noprint_wrappers=1:nokey=1", &path_str,
    ])
    .await
    .unwrap_or_default();
    let codecs: Vec<&str> = out.lines().filter(|l| !l.is_empty()).collect();
    Ok((codecs.len() as u32, codecs.first().map(|s| s.to_string())))
}

async fn probe_subtitle_count(path: &Path) -> anyhow::Result<u32> {
    let path_str = path.to_string_lossy().into_owned();
    let out = run_ffprobe(&[
        "-v", "error", "-select_streams", "s", "-show_entries", "stream=index", "-of",
        "default=noprint_wrappers=1:nokey=1", &path_str,
    ])
    .await
    .unwrap_or_default();
    Ok(out.lines().filter(|l| !l.is_empty()).count() as u32)
}

async fn probe_bitrate(path: &Path) -> Option<u64> {
    let path_str = path.to_string_lossy().into_owned();
    let out = run_ffprobe(&[
        "-v", "error", "-show_entries", "format=bit_rate", "-of", "default=noprint_wrappers=1:nokey=1", &path_str,
    ])
    .await
    .ok()?;
    out.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hms_ffmpeg_timestamp() {
        assert_eq!(parse_ffmpeg_timestamp("00:01:05.500"), Some(65.5));
    }

    #[test]
    fn sentinel_path_is_adjacent_to_output() {
        let output = PathBuf::from("/data/temp/movie.h265.Z3D.mkv");
        let sentinel = sentinel_path(&output);
        assert_eq!(sentinel.parent(), output.parent());
    }

    #[test]
    fn ghost_sentinel_from_a_crashed_encode_is_removed_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("movie.h265.Z3D.mkv");
        std::fs::write(&output, b"partial output from a crashed encode").unwrap();
        let sentinel = sentinel_path(&output);
        std::fs::write(&sentinel, br#"{"target":"movie.h265.Z3D.mkv"}"#).unwrap();

        let removed = Encoder::new().cleanup_ghost_sentinels(dir.path()).unwrap();

        assert_eq!(removed, 1);
        assert!(!sentinel.exists());
        assert!(!output.exists());
    }

    #[test]
    fn cleanup_on_an_empty_directory_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let removed = Encoder::new().cleanup_ghost_sentinels(dir.path()).unwrap();
        assert_eq!(removed, 0);
    }
}
