//! Progress reporting for long batch runs

use std::time::{Duration, Instant};

/// Snapshot handed to the progress callback. `completed` is monotone and
/// never exceeds `total`.
#[derive(Debug, Clone, Copy)]
pub struct ProgressInfo {
    pub completed: u64,
    pub total: u64,
    pub matchups_per_second: f64,
    pub estimated_remaining_seconds: f64,
    pub resumed: bool,
}

pub type ProgressCallback<'a> = dyn FnMut(&ProgressInfo) + 'a;

/// Rate/ETA tracker that limits callback invocations to twice per second.
/// The final snapshot (completed == total) always goes through.
pub struct ProgressThrottle {
    started: Instant,
    last_emit: Option<Instant>,
    started_from: u64,
    resumed: bool,
}

impl ProgressThrottle {
    pub fn new(started_from: u64, resumed: bool) -> Self {
        Self {
            started: Instant::now(),
            last_emit: None,
            started_from,
            resumed,
        }
    }

    /// Build a snapshot if enough time has passed since the last one.
    pub fn tick(&mut self, completed: u64, total: u64) -> Option<ProgressInfo> {
        let now = Instant::now();
        let due = match self.last_emit {
            Some(last) => now.duration_since(last) >= Duration::from_millis(500),
            None => true,
        };
        if !due && completed < total {
            return None;
        }
        self.last_emit = Some(now);

        let elapsed = now.duration_since(self.started).as_secs_f64();
        let done_this_session = completed.saturating_sub(self.started_from);
        let rate = if elapsed > 0.0 {
            done_this_session as f64 / elapsed
        } else {
            0.0
        };
        let remaining = total.saturating_sub(completed);
        let eta = if rate > 0.0 {
            remaining as f64 / rate
        } else {
            0.0
        };

        Some(ProgressInfo {
            completed,
            total,
            matchups_per_second: rate,
            estimated_remaining_seconds: eta,
            resumed: self.resumed,
        })
    }
}
