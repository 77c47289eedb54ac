use serde::{Deserialize, Serialize};

/// Live progress facts for a job's current phase (§3). Mirrors the shape of
/// the reference job queue's `JobProgress`, extended with `speed`/`eta` as
/// numeric fields (bytes/s, seconds) since the transfer layer and the
/// encoder both need to report them through the same struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub percent: f32,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
}

impl JobProgress {
    pub fn at_percent(percent: f32) -> Self {
        Self { percent, ..Default::default() }
    }
}
