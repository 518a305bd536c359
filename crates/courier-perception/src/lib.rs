//! `courier-perception` – the perception side of the control loop.
//!
//! # Modules
//!
//! - [`collaborator`] – contracts for the vision, wake-word and homing
//!   collaborators, plus the shared [`FrameSnapshot`][collaborator::FrameSnapshot].
//! - [`cache`] – [`PerceptionCache`][cache::PerceptionCache] (TTL reuse with
//!   stale fallback) and [`FrameSkip`][cache::FrameSkip].
//! - [`bearing`] – marker bearing from a solved angle or a pixel offset.
//! - [`sim`] – scripted collaborators for simulation and tests.

pub mod bearing;
pub mod cache;
pub mod collaborator;
pub mod sim;

pub use cache::{FrameSkip, PerceptionCache};
pub use collaborator::{
    CameraFrame, FrameSnapshot, HomingCollaborator, VisionCollaborator, WakeWordCollaborator,
};
