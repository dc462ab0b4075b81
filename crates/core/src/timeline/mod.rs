use std::time::{Duration, Instant};

use crate::config::DEFAULT_FRAME_RATE;

/// Paces sampling ticks for hosts without a native refresh callback.
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    next_deadline: Option<Instant>,
    frames: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}

impl FrameClock {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / frame_rate.max(1),
            next_deadline: None,
            frames: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of frames handed out so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Nominal time covered by the frames handed out so far.
    pub fn elapsed(&self) -> Duration {
        self.interval.saturating_mul(self.frames.min(u64::from(u32::MAX)) as u32)
    }

    pub fn reset(&mut self) {
        self.next_deadline = None;
        self.frames = 0;
    }

    /// Counts a frame without waiting.
    pub fn advance(&mut self) -> u64 {
        self.frames += 1;
        self.frames
    }

    /// Sleeps until the next frame boundary. A frame that arrives late
    /// restarts the spacing from the current instant.
    pub fn wait_next(&mut self) -> u64 {
        let now = Instant::now();
        let deadline = match self.next_deadline {
            Some(deadline) => deadline,
            None => now,
        };
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now) + self.interval);
        self.advance()
    }
}
