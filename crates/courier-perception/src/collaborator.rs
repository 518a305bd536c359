//! Contracts for the perception collaborators the control loop consumes.
//!
//! The collaborators themselves (person tracker, wake-word spotter, fiducial
//! detector) live outside this workspace. Each is expected to answer quickly:
//! anything slow runs on the collaborator's own capture thread and `update`
//! just hands back the latest result.
//!
//! | Collaborator | Calls |
//! |---|---|
//! | [`VisionCollaborator`] | `update(lock)`, `get_frame()`, `stop()` |
//! | [`WakeWordCollaborator`] | `start_listening()`, `stop()`, `detect()` |
//! | [`HomingCollaborator`] | `detect_tag(frame)` |

use std::sync::Arc;

use courier_types::{CourierError, DetectionResult, MarkerDetection};

/// A raw image frame from the vehicle camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (RGB24).
    pub data: Vec<u8>,
}

/// Read-only view of the latest frame, shared between the vision and homing
/// collaborators within one tick.
pub type FrameSnapshot = Arc<CameraFrame>;

/// Person detection and tracking.
pub trait VisionCollaborator: Send {
    /// Latest detection. When `target_track_id` is set the collaborator
    /// should prefer that track, but the caller still verifies the returned
    /// `track_id`.
    fn update(&mut self, target_track_id: Option<u64>) -> Result<DetectionResult, CourierError>;

    /// The frame the last detection was computed on.
    fn get_frame(&mut self) -> Result<FrameSnapshot, CourierError>;

    /// Stop capturing and release the camera.
    fn stop(&mut self) -> Result<(), CourierError>;
}

/// Wake-word spotting on the microphone.
pub trait WakeWordCollaborator: Send {
    fn start_listening(&mut self) -> Result<(), CourierError>;

    /// Stop listening and release the microphone.
    fn stop(&mut self) -> Result<(), CourierError>;

    /// `true` once per utterance of the wake word.
    fn detect(&mut self) -> Result<bool, CourierError>;
}

/// Home-marker detection on a shared frame.
pub trait HomingCollaborator: Send {
    fn detect_tag(&mut self, frame: &FrameSnapshot) -> Result<MarkerDetection, CourierError>;
}
