//! Shared transfer progress tracker (§4.3): percentage, smoothed speed,
//! ETA, throttled to at most one update every 500 ms.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransferProgress {
    pub percent: f32,
    pub transferred: u64,
    pub total: u64,
    pub speed_bytes_per_sec: f64,
    pub eta_secs: Option<u64>,
    pub elapsed_secs: f64,
}

use serde::{Deserialize, Serialize};

const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
/// Window over which speed is smoothed, matching the "smoothed speed (over a
/// window)" requirement rather than an instantaneous delta.
const SPEED_WINDOW: Duration = Duration::from_secs(5);

struct Sample {
    at: Instant,
    transferred: u64,
}

pub struct ProgressTracker {
    started_at: Instant,
    total: u64,
    samples: Vec<Sample>,
    last_emit: Option<Instant>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self { started_at: Instant::now(), total, samples: Vec::new(), last_emit: None }
    }

    /// Records a new transferred-byte count and returns a progress snapshot
    /// if at least `MIN_UPDATE_INTERVAL` has elapsed since the last one.
    pub fn record(&mut self, transferred: u64) -> Option<TransferProgress> {
        let now = Instant::now();
        self.samples.push(Sample { at: now, transferred });
        self.samples.retain(|s| now.duration_since(s.at) <= SPEED_WINDOW);

        if self.last_emit.is_some_and(|last| now.duration_since(last) < MIN_UPDATE_INTERVAL) {
            return None;
        }
        self.last_emit = Some(now);

        let speed = self.smoothed_speed(now);
        let remaining = self.total.saturating_sub(transferred);
        let eta_secs = if speed > 0.0 { Some((remaining as f64 / speed).round() as u64) } else { None };
        let percent = if self.total > 0 { (transferred as f64 / self.total as f64 * 100.0) as f32 } else { 0.0 };

        Some(TransferProgress {
            percent,
            transferred,
            total: self.total,
            speed_bytes_per_sec: speed,
            eta_secs,
            elapsed_secs: now.duration_since(self.started_at).as_secs_f64(),
        })
    }

    fn smoothed_speed(&self, now: Instant) -> f64 {
        let Some(oldest) = self.samples.first() else { return 0.0 };
        let elapsed = now.duration_since(oldest.at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        let delta = self.samples.last().map(|s| s.transferred).unwrap_or(0).saturating_sub(oldest.transferred);
        delta as f64 / elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_emits() {
        let mut tracker = ProgressTracker::new(1000);
        let progress = tracker.record(100).unwrap();
        assert_eq!(progress.transferred, 100);
        assert_eq!(progress.total, 1000);
    }

    #[test]
    fn second_update_within_window_is_throttled() {
        let mut tracker = ProgressTracker::new(1000);
        tracker.record(100).unwrap();
        assert!(tracker.record(200).is_none());
    }
}
