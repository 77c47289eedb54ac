//! Explicit state transition table (§4.6, §9 design note: "ad-hoc status
//! strings" are structurally impossible outside the Job Store's serialized
//! column — every transition goes through `apply`).

use crate::domain::JobStatus;
use crate::error::ErrorKind;

#[derive(Debug, Clone)]
pub enum Transition {
    StartDownload,
    DownloadComplete,
    /// Admission short-circuit: source already matches the target family.
    SkipEncodeAlreadyMatching,
    StartEncode,
    EncodeComplete { requires_approval: bool },
    Approve,
    Reject { reason: String },
    StartUpload,
    UploadComplete,
    Fail { kind: ErrorKind, message: String },
    Pause,
    Resume,
    /// Resets a failed/paused job back to the earliest phase whose inputs
    /// are still valid (§4.6 Retry / user-invoked `retry(id)`).
    RetryInto(Box<JobStatus>),
    /// Startup crash recovery (§4.5, §8 scenario 6): a job caught mid-phase
    /// by a process crash is rewound to the start of that phase once its
    /// ghost sentinel/partial output has been cleaned up.
    RecoverFromCrash(Box<JobStatus>),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot apply {transition:?} to job in state {from:?}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub transition: String,
}

pub fn apply(state: JobStatus, event: Transition) -> Result<JobStatus, InvalidTransition> {
    use JobStatus::*;

    let invalid = |from: &JobStatus, transition: &Transition| InvalidTransition {
        from: from.clone(),
        transition: format!("{transition:?}"),
    };

    match (&state, &event) {
        (_, Transition::Pause) if !state.is_terminal() && !matches!(state, Paused { .. }) => {
            Ok(Paused { resume_into: Box::new(state) })
        }
        (Paused { resume_into }, Transition::Resume) => Ok((**resume_into).clone()),
        (_, Transition::Fail { kind, message }) if !state.is_terminal() => {
            Ok(Failed { kind: *kind, message: message.clone() })
        }
        (Failed { .. } | Paused { .. }, Transition::RetryInto(target)) => Ok((**target).clone()),
        (_, Transition::RecoverFromCrash(target)) if !state.is_terminal() => Ok((**target).clone()),

        (Waiting, Transition::StartDownload) => Ok(Downloading),
        (Waiting, Transition::SkipEncodeAlreadyMatching) => Ok(ReadyUpload),
        (Downloading, Transition::DownloadComplete) => Ok(ReadyEncode),
        (ReadyEncode, Transition::StartEncode) => Ok(Encoding),
        (Encoding, Transition::EncodeComplete { requires_approval: true }) => Ok(AwaitingApproval),
        (Encoding, Transition::EncodeComplete { requires_approval: false }) => Ok(ReadyUpload),
        (AwaitingApproval, Transition::Approve) => Ok(ReadyUpload),
        (AwaitingApproval, Transition::Reject { reason }) => Ok(Failed { kind: ErrorKind::UserRejected, message: reason.clone() }),
        (ReadyUpload, Transition::StartUpload) => Ok(Uploading),
        (Uploading, Transition::UploadComplete) => Ok(Completed),

        _ => Err(invalid(&state, &event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_advances_through_every_phase() {
        let mut state = JobStatus::Waiting;
        state = apply(state, Transition::StartDownload).unwrap();
        assert_eq!(state, JobStatus::Downloading);
        state = apply(state, Transition::DownloadComplete).unwrap();
        assert_eq!(state, JobStatus::ReadyEncode);
        state = apply(state, Transition::StartEncode).unwrap();
        assert_eq!(state, JobStatus::Encoding);
        state = apply(state, Transition::EncodeComplete { requires_approval: false }).unwrap();
        assert_eq!(state, JobStatus::ReadyUpload);
        state = apply(state, Transition::StartUpload).unwrap();
        assert_eq!(state, JobStatus::Uploading);
        state = apply(state, Transition::UploadComplete).unwrap();
        assert_eq!(state, JobStatus::Completed);
    }

    #[test]
    fn admission_short_circuit_skips_straight_to_ready_upload() {
        let state = apply(JobStatus::Waiting, Transition::SkipEncodeAlreadyMatching).unwrap();
        assert_eq!(state, JobStatus::ReadyUpload);
    }

    #[test]
    fn pause_then_resume_returns_to_prior_state() {
        let state = JobStatus::Encoding;
        let paused = apply(state.clone(), Transition::Pause).unwrap();
        assert_eq!(paused, JobStatus::Paused { resume_into: Box::new(state.clone()) });
        let resumed = apply(paused, Transition::Resume).unwrap();
        assert_eq!(resumed, state);
    }

    #[test]
    fn awaiting_approval_rejection_fails_with_reason() {
        let state = apply(JobStatus::AwaitingApproval, Transition::Reject { reason: "too large".into() }).unwrap();
        assert_eq!(state, JobStatus::Failed { kind: ErrorKind::UserRejected, message: "too large".into() });
    }

    #[test]
    fn cannot_start_upload_before_encoding() {
        let result = apply(JobStatus::Waiting, Transition::StartUpload);
        assert!(result.is_err());
    }

    #[test]
    fn completed_job_cannot_be_paused_or_failed() {
        assert!(apply(JobStatus::Completed, Transition::Pause).is_err());
        assert!(apply(JobStatus::Completed, Transition::Fail { kind: ErrorKind::EncoderFailed, message: "x".into() }).is_err());
    }

    #[test]
    fn retry_resets_failed_job_to_chosen_phase() {
        let failed = JobStatus::Failed { kind: ErrorKind::NetworkTransient, message: "timeout".into() };
        let retried = apply(failed, Transition::RetryInto(Box::new(JobStatus::ReadyEncode))).unwrap();
        assert_eq!(retried, JobStatus::ReadyEncode);
    }

    #[test]
    fn crash_recovery_rewinds_a_mid_encode_job_to_ready_encode() {
        let recovered = apply(JobStatus::Encoding, Transition::RecoverFromCrash(Box::new(JobStatus::ReadyEncode))).unwrap();
        assert_eq!(recovered, JobStatus::ReadyEncode);
    }

    #[test]
    fn crash_recovery_cannot_touch_a_completed_job() {
        assert!(apply(JobStatus::Completed, Transition::RecoverFromCrash(Box::new(JobStatus::ReadyEncode))).is_err());
    }
}
