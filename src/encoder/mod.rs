//! Encoder (§4.5): wraps the external `ffmpeg`/`ffprobe` processes behind a
//! deterministic argument builder, a progress-parsing encode call, and a
//! hardware-availability probe cached for the process lifetime.

mod args;
mod naming;
mod probe;
mod process;

pub use args::build_args;
pub use naming::generate_encoded_filename;
pub use probe::HardwareProbe;
pub use process::{EncodeOutcome, Encoder};

use serde::{Deserialize, Serialize};

/// Facts about the source file, probed before admission and again after
/// encoding to verify the output (§4.5 Verification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub duration_secs: f64,
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: Option<u64>,
    pub audio_track_count: u32,
    pub audio_codec: Option<String>,
    pub subtitle_track_count: u32,
}
