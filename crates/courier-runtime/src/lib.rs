//! `courier-runtime` – the control loop that ties hardware, kernel and
//! perception together.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`ControlLoop`][orchestrator::ControlLoop]: interlock,
//!   per-state handlers, recovery and shutdown.
//! - [`search`] – [`SearchBackoff`][search::SearchBackoff], the growing wait
//!   between recovery sweeps.
//! - [`stats`] – [`LoopStats`][stats::LoopStats], periodic loop-rate figures.
//! - [`telemetry`] – `tracing` subscriber and optional OTLP export.

pub mod orchestrator;
pub mod search;
pub mod stats;
pub mod telemetry;

pub use orchestrator::{Collaborators, ControlLoop, ReturnLeg};
pub use search::SearchBackoff;
