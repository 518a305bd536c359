//! [`SearchBackoff`] – the growing wait between search sweeps.
//!
//! Used by both recovery searches: "person lost" while following and
//! "marker lost" while returning home. Each failed sweep waits
//! `current + extra`, then grows `current` by `step` up to `cap`. Any
//! success resets `current` to `base`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use courier_runtime::search::SearchBackoff;
//! use courier_types::config::BackoffConfig;
//!
//! let mut b = SearchBackoff::new(BackoffConfig::default());
//! assert_eq!(b.wait(), Duration::from_secs_f64(0.15));
//! b.grow();
//! b.grow();
//! assert!((b.current() - 0.35).abs() < 1e-9);
//! b.reset();
//! assert_eq!(b.current(), 0.15);
//! ```

use std::time::Duration;

use courier_types::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct SearchBackoff {
    cfg: BackoffConfig,
    current: f64,
}

impl SearchBackoff {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self {
            cfg,
            current: cfg.base_secs,
        }
    }

    /// How long the next sweep waits.
    pub fn wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.current + self.cfg.extra_secs).unwrap_or_default()
    }

    /// Record one more failed sweep.
    pub fn grow(&mut self) {
        self.current = (self.current + self.cfg.step_secs).min(self.cfg.cap_secs);
    }

    pub fn reset(&mut self) {
        self.current = self.cfg.base_secs;
    }

    /// Current interval in seconds, without `extra`.
    pub fn current(&self) -> f64 {
        self.current
    }
}
