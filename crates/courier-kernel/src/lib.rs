//! `courier-kernel` – safety and bookkeeping core of the vehicle.
//!
//! Nothing in here touches hardware or perception; both types are fed by the
//! control loop and answer synchronously.
//!
//! # Modules
//!
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]:
//!   current and previous [`OperationalState`][courier_types::OperationalState]
//!   plus the time spent in the current one.
//! - [`proximity_guard`] – [`ProximityGuard`][proximity_guard::ProximityGuard]:
//!   debounces the raw proximity line into the interlock signal.

pub mod proximity_guard;
pub mod state_machine;

pub use proximity_guard::ProximityGuard;
pub use state_machine::StateMachine;
