//! Structured error kinds shared across the pipeline, plus the `PipelineError`
//! wrapper that attaches a kind and optional job id to whatever `anyhow`
//! context a component already built up.

use std::fmt;

/// Stable, user-facing failure classification (§7). Every `failed` job
/// carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkTransient,
    NetworkFatal,
    AuthFailed,
    NotFound,
    InsufficientSpace,
    IntegrityMismatch,
    EncoderUnavailable,
    EncoderFailed,
    OutputLargerThanInput,
    BackupFailed,
    RollbackFailed,
    InvalidConfig,
    ProtocolCapabilityMissing,
    UserRejected,
}

impl ErrorKind {
    /// Transient errors are retried locally by the offending component;
    /// everything else fails fast (§4.3, §7).
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NetworkTransient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkTransient => "network_transient",
            ErrorKind::NetworkFatal => "network_fatal",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientSpace => "insufficient_space",
            ErrorKind::IntegrityMismatch => "integrity_mismatch",
            ErrorKind::EncoderUnavailable => "encoder_unavailable",
            ErrorKind::EncoderFailed => "encoder_failed",
            ErrorKind::OutputLargerThanInput => "output_larger_than_input",
            ErrorKind::BackupFailed => "backup_failed",
            ErrorKind::RollbackFailed => "rollback_failed",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::ProtocolCapabilityMissing => "protocol_capability_missing",
            ErrorKind::UserRejected => "user_rejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job-attributable, kind-tagged error. Crosses component boundaries the
/// way `TransferError` does in the reference transfer module, but carries a
/// fixed `ErrorKind` rather than an open set of per-operation variants so the
/// orchestrator can always attach a stable kind to a failed job.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    pub job_id: Option<i64>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), job_id: None }
    }

    pub fn with_job(mut self, job_id: i64) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

/// Convenience so `PipelineError` composes with `anyhow::Result` call chains
/// the same way the reference code threads `TransferError` through `anyhow`.
pub fn err(kind: ErrorKind, message: impl Into<String>) -> anyhow::Error {
    PipelineError::new(kind, message).into()
}

/// Recover a `PipelineError`'s kind from an arbitrary `anyhow::Error`,
/// falling back to `NetworkFatal` for errors the pipeline didn't classify
/// itself (IO errors bubbling up from `std`, etc).
pub fn classify(e: &anyhow::Error) -> ErrorKind {
    e.downcast_ref::<PipelineError>().map(|p| p.kind).unwrap_or(ErrorKind::NetworkFatal)
}
