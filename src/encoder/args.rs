//! Deterministic ffmpeg argument builder (§4.5): `(CodecFamily, EncodeMode,
//! &PipelineConfig, &InputInfo) -> Vec<String>`, unit-testable without ever
//! spawning a process.

use super::InputInfo;
use crate::config::{AudioCodec, FfmpegConfig, PipelineConfig, Profile};
use crate::domain::{CodecFamily, EncodeMode};

pub fn build_args(family: CodecFamily, mode: EncodeMode, config: &PipelineConfig, input: &InputInfo) -> Vec<String> {
    let ffmpeg = &config.ffmpeg;
    let mut args = vec!["-y".to_string(), "-i".to_string(), String::new()];
    // The caller overwrites args[2] with the real input path; kept as an
    // explicit placeholder so the positional contract is visible here.
    args.truncate(0);

    args.push("-y".into());
    args.push("-map".into());
    args.push("0".into());

    match (family, mode) {
        (CodecFamily::Hevc, EncodeMode::Gpu) => push_hevc_nvenc_args(&mut args, ffmpeg),
        (CodecFamily::Hevc, EncodeMode::Cpu) => push_libx265_args(&mut args, ffmpeg),
        (CodecFamily::Vp9, EncodeMode::Gpu) => push_vp9_nvenc_args(&mut args, ffmpeg),
        (CodecFamily::Vp9, EncodeMode::Cpu) => push_libvpx_vp9_args(&mut args, ffmpeg),
    }

    push_audio_args(&mut args, ffmpeg);

    // Subtitle and data streams ride along untouched.
    args.push("-c:s".into());
    args.push("copy".into());

    let _ = input;
    args
}

fn push_hevc_nvenc_args(args: &mut Vec<String>, ffmpeg: &FfmpegConfig) {
    args.push("-c:v".into());
    args.push("hevc_nvenc".into());
    args.push("-preset".into());
    args.push(ffmpeg.encode_preset.clone());
    args.push("-rc".into());
    args.push(ffmpeg.rc_mode.clone());
    args.push("-cq".into());
    args.push(ffmpeg.cq.to_string());
    if let Some(bitrate) = &ffmpeg.bitrate {
        args.push("-b:v".into());
        args.push(bitrate.clone());
    }
    if let Some(maxrate) = &ffmpeg.maxrate {
        args.push("-maxrate".into());
        args.push(maxrate.clone());
    }
    if let Some(lookahead) = ffmpeg.lookahead {
        args.push("-rc-lookahead".into());
        args.push(lookahead.to_string());
    }
    if let Some(bframes) = ffmpeg.bframes {
        args.push("-bf".into());
        args.push(bframes.to_string());
    }
    if let Some(b_ref_mode) = &ffmpeg.b_ref_mode {
        args.push("-b_ref_mode".into());
        args.push(b_ref_mode.clone());
    }
    args.push("-spatial-aq".into());
    args.push(bool_flag(ffmpeg.spatial_aq));
    args.push("-temporal-aq".into());
    args.push(bool_flag(ffmpeg.temporal_aq));
    if let Some(strength) = ffmpeg.aq_strength {
        args.push("-aq-strength".into());
        args.push(strength.to_string());
    }
    if let Some(multipass) = &ffmpeg.multipass {
        args.push("-multipass".into());
        args.push(multipass.clone());
    }
    args.push("-profile:v".into());
    args.push(profile_name(ffmpeg.profile).into());
    if ffmpeg.profile == Profile::Main10 {
        args.push("-pix_fmt".into());
        args.push("p010le".into());
    }
    if let Some(tune) = &ffmpeg.tune {
        args.push("-tune".into());
        args.push(tune.clone());
    }
    if ffmpeg.two_pass {
        args.push("-2pass".into());
        args.push("1".into());
    }
}

fn push_vp9_nvenc_args(args: &mut Vec<String>, ffmpeg: &FfmpegConfig) {
    args.push("-c:v".into());
    args.push("vp9_nvenc".into());
    args.push("-preset".into());
    args.push(ffmpeg.encode_preset.clone());
    args.push("-rc".into());
    args.push(ffmpeg.rc_mode.clone());
    args.push("-cq".into());
    args.push(ffmpeg.cq.to_string());
    if let Some(bitrate) = &ffmpeg.bitrate {
        args.push("-b:v".into());
        args.push(bitrate.clone());
    }
    if let Some(maxrate) = &ffmpeg.maxrate {
        args.push("-maxrate".into());
        args.push(maxrate.clone());
    }
    args.push("-spatial-aq".into());
    args.push(bool_flag(ffmpeg.spatial_aq));
    if let Some(strength) = ffmpeg.aq_strength {
        args.push("-aq-strength".into());
        args.push(strength.to_string());
    }
    if ffmpeg.two_pass {
        args.push("-2pass".into());
        args.push("1".into());
    }
}

fn push_libx265_args(args: &mut Vec<String>, ffmpeg: &FfmpegConfig) {
    args.push("-c:v".into());
    args.push("libx265".into());
    args.push("-preset".into());
    args.push(ffmpeg.cpu_preset.clone());
    args.push("-crf".into());
    args.push(ffmpeg.crf.to_string());
    if ffmpeg.profile == Profile::Main10 {
        args.push("-pix_fmt".into());
        args.push("p010le".into());
        args.push("-profile:v".into());
        args.push("main10".into());
    }
    if let Some(tune) = &ffmpeg.tune {
        args.push("-tune".into());
        args.push(tune.clone());
    }
    if ffmpeg.two_pass {
        args.push("-pass".into());
        args.push("1".into());
    }
}

fn push_libvpx_vp9_args(args: &mut Vec<String>, ffmpeg: &FfmpegConfig) {
    args.push("-c:v".into());
    args.push("libvpx-vp9".into());
    args.push("-crf".into());
    args.push(ffmpeg.crf.to_string());
    args.push("-b:v".into());
    args.push(ffmpeg.bitrate.clone().unwrap_or_else(|| "0".into()));
    args.push("-cpu-used".into());
    args.push(nvenc_preset_to_cpu_used(&ffmpeg.encode_preset).to_string());
    args.push("-row-mt".into());
    args.push("1".into());
    if ffmpeg.two_pass {
        args.push("-pass".into());
        args.push("1".into());
    }
}

fn push_audio_args(args: &mut Vec<String>, ffmpeg: &FfmpegConfig) {
    match ffmpeg.audio_codec {
        AudioCodec::Copy => {
            args.push("-c:a".into());
            args.push("copy".into());
        }
        other => {
            args.push("-c:a".into());
            args.push(audio_codec_name(other).into());
            if let Some(bitrate) = &ffmpeg.audio_bitrate {
                args.push("-b:a".into());
                args.push(bitrate.clone());
            }
        }
    }
}

fn audio_codec_name(codec: AudioCodec) -> &'static str {
    match codec {
        AudioCodec::Copy => "copy",
        AudioCodec::Aac => "aac",
        AudioCodec::Ac3 => "ac3",
        AudioCodec::Opus => "libopus",
    }
}

fn profile_name(profile: Profile) -> &'static str {
    match profile {
        Profile::Main => "main",
        Profile::Main10 => "main10",
    }
}

fn bool_flag(v: bool) -> String {
    if v { "1".into() } else { "0".into() }
}

/// NVENC presets are `p1`..`p7` (fastest to slowest/highest quality);
/// `libvpx-vp9`'s `cpu-used` runs the opposite direction (0 = slowest/best),
/// so this maps one onto the other for a config shared across codec
/// families.
fn nvenc_preset_to_cpu_used(preset: &str) -> u32 {
    match preset {
        "p1" => 8,
        "p2" => 7,
        "p3" => 6,
        "p4" => 5,
        "p5" => 4,
        "p6" => 2,
        "p7" => 0,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn sample_input() -> InputInfo {
        InputInfo {
            duration_secs: 120.0,
            codec_name: "h264".into(),
            width: 1920,
            height: 1080,
            bitrate: Some(4_000_000),
            audio_track_count: 1,
            audio_codec: Some("aac".into()),
            subtitle_track_count: 0,
        }
    }

    #[test]
    fn hevc_gpu_includes_nvenc_codec_and_cq() {
        let config = PipelineConfig::default();
        let args = build_args(CodecFamily::Hevc, EncodeMode::Gpu, &config, &sample_input());
        assert!(args.windows(2).any(|w| w == ["-c:v", "hevc_nvenc"]));
        assert!(args.windows(2).any(|w| w == ["-cq", "24"]));
    }

    #[test]
    fn hevc_cpu_uses_libx265_and_crf() {
        let config = PipelineConfig::default();
        let args = build_args(CodecFamily::Hevc, EncodeMode::Cpu, &config, &sample_input());
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx265"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "24"]));
    }

    #[test]
    fn main10_profile_sets_pixel_format() {
        let mut config = PipelineConfig::default();
        config.ffmpeg.profile = Profile::Main10;
        let args = build_args(CodecFamily::Hevc, EncodeMode::Gpu, &config, &sample_input());
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "p010le"]));
    }

    #[test]
    fn audio_defaults_to_copy() {
        let config = PipelineConfig::default();
        let args = build_args(CodecFamily::Hevc, EncodeMode::Gpu, &config, &sample_input());
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
    }

    #[test]
    fn always_maps_all_streams_and_copies_subtitles() {
        let config = PipelineConfig::default();
        let args = build_args(CodecFamily::Vp9, EncodeMode::Cpu, &config, &sample_input());
        assert!(args.windows(2).any(|w| w == ["-map", "0"]));
        assert!(args.windows(2).any(|w| w == ["-c:s", "copy"]));
    }
}
