use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CodecFamily, JobProgress};
use crate::error::ErrorKind;

/// Pipeline state (§3, §4.6). A tagged value, never a bare string — the
/// transition table in `crate::queue::state` is the only code allowed to
/// produce a new variant from an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Downloading,
    ReadyEncode,
    Encoding,
    AwaitingApproval,
    ReadyUpload,
    Uploading,
    Completed,
    Failed { kind: ErrorKind, message: String },
    /// `resume_into` is the state the job was in before it was paused, so
    /// resuming never has to guess (§4.6 "paused returns to the previous
    /// pre-pause state on resume").
    Paused { resume_into: Box<JobStatus> },
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Downloading => "downloading",
            JobStatus::ReadyEncode => "ready_encode",
            JobStatus::Encoding => "encoding",
            JobStatus::AwaitingApproval => "awaiting_approval",
            JobStatus::ReadyUpload => "ready_upload",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Paused { .. } => "paused",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }
}

/// Audio-track summary from the source probe (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioPolicy {
    pub track_count: u32,
    pub codec: Option<String>,
}

/// Facts established by probing the source before admission (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFacts {
    pub size: u64,
    pub codec_before: String,
    pub container: String,
    pub resolution: Option<(u32, u32)>,
    pub duration: f64,
    pub bitrate: Option<u64>,
    pub audio: AudioPolicy,
    pub subtitle_track_count: u32,
}

/// Facts known only once the job finishes (or short-circuits) (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeFacts {
    pub codec_after: Option<String>,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub compression_ratio: Option<f64>,
    pub error_message: Option<String>,
}

impl OutcomeFacts {
    /// `compression_ratio = 1 − compressed_size/original_size` whenever both
    /// sizes are known (§3 invariant).
    pub fn recompute_ratio(&mut self) {
        if let (Some(orig), Some(compressed)) = (self.original_size, self.compressed_size) {
            if orig > 0 {
                self.compression_ratio = Some(1.0 - (compressed as f64 / orig as f64));
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timing {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// Derived local/remote paths a job accumulates as it moves through phases
/// (§3, §6 "Local temp layout").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPaths {
    pub local_download: Option<String>,
    pub local_encoded: Option<String>,
    pub local_original_backup: Option<String>,
    pub remote_backup: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub remote_path: String,
    pub source: SourceFacts,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub outcome: OutcomeFacts,
    pub timing: Timing,
    pub paths: JobPaths,
    /// Target family resolved at admission time; fixed for the job's
    /// lifetime even if configuration changes mid-flight.
    pub target_family: CodecFamily,
}

impl Job {
    pub fn new(id: i64, remote_path: String, source: SourceFacts, target_family: CodecFamily) -> Self {
        Self {
            id,
            remote_path,
            source,
            status: JobStatus::Waiting,
            progress: JobProgress::default(),
            outcome: OutcomeFacts::default(),
            timing: Timing { created_at: Some(Utc::now()), ..Default::default() },
            paths: JobPaths::default(),
            target_family,
        }
    }

    /// Source codec already matches the configured target family (§4.6
    /// Admission's skip-when-matching short-circuit).
    pub fn source_already_matches_target(&self) -> bool {
        self.source.codec_before.eq_ignore_ascii_case(self.target_family.probe_codec_name())
    }
}
