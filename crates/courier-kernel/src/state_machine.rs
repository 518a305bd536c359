//! [`StateMachine`] – current/previous operational state plus the instant the
//! current state was entered.
//!
//! Pure bookkeeping: no I/O, no transition table. Deciding *when* to move is
//! the control loop's job; this type only records that it happened.
//!
//! Time is read from `tokio::time::Instant`, so a paused tokio clock drives
//! it deterministically.
//!
//! # Example
//!
//! ```
//! use courier_kernel::StateMachine;
//! use courier_types::OperationalState;
//!
//! let mut sm = StateMachine::new(OperationalState::Idle);
//! sm.transition_to(OperationalState::FollowingUser);
//! assert_eq!(sm.current(), OperationalState::FollowingUser);
//! assert_eq!(sm.previous(), OperationalState::Idle);
//! ```

use std::time::Duration;

use courier_types::OperationalState;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct StateMachine {
    current: OperationalState,
    previous: OperationalState,
    entered_at: Instant,
}

impl StateMachine {
    /// Start in `initial`; `previous` equals `initial` until the first
    /// transition.
    pub fn new(initial: OperationalState) -> Self {
        Self {
            current: initial,
            previous: initial,
            entered_at: Instant::now(),
        }
    }

    /// Move to `next`. Always overwrites `previous` and restarts the state
    /// timer, including when `next` is the current state.
    pub fn transition_to(&mut self, next: OperationalState) {
        info!(from = ?self.current, to = ?next, "state transition");
        self.previous = self.current;
        self.current = next;
        self.entered_at = Instant::now();
    }

    pub fn current(&self) -> OperationalState {
        self.current
    }

    pub fn previous(&self) -> OperationalState {
        self.previous
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// `true` once strictly more than `limit` has passed since entry.
    pub fn is_timeout(&self, limit: Duration) -> bool {
        self.time_in_state() > limit
    }
}
