//! [`LoopStats`] – control-loop throughput over fixed windows of ticks.

use tokio::time::Instant;

/// Rate over the last window plus the extremes seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRate {
    pub hz: f64,
    pub min_hz: f64,
    pub max_hz: f64,
}

#[derive(Debug, Clone)]
pub struct LoopStats {
    window: u64,
    ticks: u64,
    window_start: Option<Instant>,
    min_hz: f64,
    max_hz: f64,
}

impl LoopStats {
    /// Report every `window` ticks. A window of 0 is treated as 1.
    pub fn new(window: u64) -> Self {
        Self {
            window: window.max(1),
            ticks: 0,
            window_start: None,
            min_hz: f64::INFINITY,
            max_hz: 0.0,
        }
    }

    /// Record one tick at `now`; returns the window's rate when it closes.
    pub fn record(&mut self, now: Instant) -> Option<LoopRate> {
        let start = *self.window_start.get_or_insert(now);
        self.ticks += 1;
        if self.ticks % self.window != 0 {
            return None;
        }
        self.window_start = Some(now);
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let hz = self.window as f64 / elapsed;
        self.min_hz = self.min_hz.min(hz);
        self.max_hz = self.max_hz.max(hz);
        Some(LoopRate {
            hz,
            min_hz: self.min_hz,
            max_hz: self.max_hz,
        })
    }

    /// Ticks recorded since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
