//! [`PerceptionCache`] and [`FrameSkip`] – bound how often the expensive
//! vision collaborator is actually queried.
//!
//! Per poll the control loop asks the cache for a result:
//!
//! 1. cached result younger than the TTL → reuse it;
//! 2. otherwise, if the frame-skip counter says this poll may refresh →
//!    call the collaborator and cache what it returns;
//! 3. otherwise → the last cached result, however stale, or `T::default()`
//!    when nothing has been cached yet.
//!
//! Timestamps come from `tokio::time::Instant`.

use std::time::Duration;

use courier_types::CourierError;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct PerceptionCache<T> {
    entry: Option<(T, Instant)>,
}

impl<T> Default for PerceptionCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T: Clone + Default> PerceptionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a result per the policy above.
    ///
    /// A failing `refresh` leaves the cache untouched and propagates the
    /// error.
    pub fn get_or_refresh<F>(
        &mut self,
        now: Instant,
        ttl: Duration,
        should_refresh: bool,
        refresh: F,
    ) -> Result<T, CourierError>
    where
        F: FnOnce() -> Result<T, CourierError>,
    {
        if let Some((value, at)) = &self.entry {
            if now.saturating_duration_since(*at) < ttl {
                trace!("perception cache hit");
                return Ok(value.clone());
            }
        }
        if should_refresh {
            let fresh = refresh()?;
            self.entry = Some((fresh.clone(), now));
            trace!("perception cache refreshed");
            return Ok(fresh);
        }
        Ok(self
            .entry
            .as_ref()
            .map(|(value, _)| value.clone())
            .unwrap_or_default())
    }

    /// Age of the cached result at `now`, if any.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.entry
            .as_ref()
            .map(|(_, at)| now.saturating_duration_since(*at))
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

/// Frame-skip counter: every `interval`-th poll may refresh, starting with
/// the first.
#[derive(Debug, Clone)]
pub struct FrameSkip {
    interval: u32,
    counter: u64,
}

impl FrameSkip {
    /// An `interval` of 0 is treated as 1 (refresh on every poll).
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
        }
    }

    /// Advance one poll and report whether it may refresh.
    pub fn advance(&mut self) -> bool {
        let due = self.counter % u64::from(self.interval) == 0;
        self.counter = self.counter.wrapping_add(1);
        due
    }
}
