//! `courier-types` – shared vocabulary of the Courier vehicle stack.
//!
//! Every other crate speaks in these types: the operational state the
//! controller is in, what the perception collaborators report back, the
//! workspace-wide error, and the [`config::CourierConfig`] tree that is built
//! once at startup and handed to each component constructor.

pub mod config;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::CourierConfig;

/// The operational state of the vehicle. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalState {
    /// Parked, steering centered, waiting for the wake word.
    Idle,
    /// Stationary, looking for a person with a raised arm.
    TrackingUser,
    /// Driving toward the locked person with adaptive speed.
    FollowingUser,
    /// Parked at the person for the interaction dwell.
    Stopped,
    /// Turning around and seeking the home marker.
    ReturningHome,
}

impl OperationalState {
    /// States in which a proximity trip means "arrived at the person" and
    /// therefore leads to [`OperationalState::Stopped`].
    pub fn is_movement(self) -> bool {
        matches!(
            self,
            OperationalState::TrackingUser | OperationalState::FollowingUser
        )
    }
}

/// One answer from the vision collaborator.
///
/// `angle` is the signed horizontal bearing of the person in degrees
/// (negative = left); it is absent when the detector saw a body but could not
/// compute a bearing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub person_detected: bool,
    pub arm_raised: bool,
    pub angle: Option<f64>,
    pub is_centered: bool,
    pub track_id: Option<u64>,
}

impl DetectionResult {
    /// A detection of `track_id` at `angle` degrees.
    pub fn person(track_id: u64, angle: f64, is_centered: bool) -> Self {
        Self {
            person_detected: true,
            arm_raised: false,
            angle: Some(angle),
            is_centered,
            track_id: Some(track_id),
        }
    }

    /// Same detection with the raised-arm flag set.
    pub fn with_arm_raised(mut self) -> Self {
        self.arm_raised = true;
        self
    }
}

/// One answer from the homing (fiducial marker) collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub detected: bool,
    /// Horizontal pixel coordinate of the marker center.
    pub center_x: i32,
    pub distance_m: Option<f64>,
    /// Bearing in degrees, when the collaborator could solve the pose.
    pub angle: Option<f64>,
    pub tag_id: Option<u64>,
    pub is_centered: bool,
}

/// Workspace-wide error type spanning hardware, perception and configuration
/// failures.
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Perception Error in {collaborator}: {details}")]
    Perception {
        collaborator: String,
        details: String,
    },

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl CourierError {
    /// Shorthand for a [`CourierError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        CourierError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Shorthand for a [`CourierError::Perception`].
    pub fn perception(collaborator: impl Into<String>, details: impl Into<String>) -> Self {
        CourierError::Perception {
            collaborator: collaborator.into(),
            details: details.into(),
        }
    }
}
