//! Central data model (§3): `Job` and its nested facts, plus the codec
//! family/mode vocabulary the encoder and the naming scheme share.

mod job;
mod progress;

pub use job::{AudioPolicy, Job, JobPaths, JobStatus, OutcomeFacts, SourceFacts, Timing};
pub use progress::JobProgress;

use serde::{Deserialize, Serialize};

/// Target codec family selected by configuration (§ GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFamily {
    Hevc,
    Vp9,
}

impl CodecFamily {
    /// Filename marker inserted by the encoder's output-naming scheme
    /// (§4.5): `h265` for HEVC, `vp9` for VP9.
    pub fn marker(self) -> &'static str {
        match self {
            CodecFamily::Hevc => "h265",
            CodecFamily::Vp9 => "vp9",
        }
    }

    /// Codec name as ffprobe reports it, used when verifying an encode
    /// actually produced the target family (§4.5 Verification).
    pub fn probe_codec_name(self) -> &'static str {
        match self {
            CodecFamily::Hevc => "hevc",
            CodecFamily::Vp9 => "vp9",
        }
    }

    pub fn all_markers() -> &'static [&'static str] {
        &["h265", "vp9"]
    }
}

/// Hardware vs software encode mode (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    Gpu,
    Cpu,
}
