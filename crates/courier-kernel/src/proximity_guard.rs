//! [`ProximityGuard`] – debounce for the raw proximity line.
//!
//! Counts consecutive `true` samples; any `false` resets the count. The guard
//! reports tripped while the count is at or above the threshold. With the
//! default threshold of 1 every raw `true` trips immediately.

use tracing::trace;

#[derive(Debug, Clone)]
pub struct ProximityGuard {
    threshold: u32,
    consecutive: u32,
}

impl ProximityGuard {
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Feed one raw sample and return the debounced state.
    pub fn sample(&mut self, raw: bool) -> bool {
        if raw {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        let tripped = self.is_tripped();
        trace!(raw, consecutive = self.consecutive, tripped, "proximity sample");
        tripped
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
