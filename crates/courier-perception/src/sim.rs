//! Scripted collaborators for simulation and tests.
//!
//! Each type is a cheap cloneable handle over shared state: hand one clone to
//! the control loop and keep another to script answers and inspect calls.
//!
//! ```rust
//! use courier_perception::sim::ScriptedVision;
//! use courier_perception::VisionCollaborator;
//! use courier_types::DetectionResult;
//!
//! let script = ScriptedVision::new();
//! let mut vision = script.clone();
//! script.push(DetectionResult::person(7, 10.0, true));
//!
//! assert_eq!(vision.update(None).unwrap().track_id, Some(7));
//! assert!(!vision.update(None).unwrap().person_detected);
//! assert_eq!(script.requested_locks(), vec![None, None]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier_types::{CourierError, DetectionResult, MarkerDetection};

use crate::collaborator::{
    CameraFrame, FrameSnapshot, HomingCollaborator, VisionCollaborator, WakeWordCollaborator,
};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Vision
// ────────────────────────────────────────────────────────────────────────────

/// `update` lock arguments kept for inspection; older ones are dropped.
pub const LOCK_HISTORY_LEN: usize = 256;

struct VisionState {
    queue: VecDeque<DetectionResult>,
    fallback: DetectionResult,
    frame: FrameSnapshot,
    requested_locks: VecDeque<Option<u64>>,
    update_calls: usize,
    failing: bool,
    stopped: bool,
}

/// Answers `update` from a queue, then from a fallback (nobody seen).
#[derive(Clone)]
pub struct ScriptedVision(Arc<Mutex<VisionState>>);

impl Default for ScriptedVision {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedVision {
    /// Empty script and a blank 640×480 frame.
    pub fn new() -> Self {
        Self::with_frame(CameraFrame {
            width: 640,
            height: 480,
            data: vec![0u8; 640 * 480 * 3],
        })
    }

    pub fn with_frame(frame: CameraFrame) -> Self {
        Self(Arc::new(Mutex::new(VisionState {
            queue: VecDeque::new(),
            fallback: DetectionResult::default(),
            frame: Arc::new(frame),
            requested_locks: VecDeque::new(),
            update_calls: 0,
            failing: false,
            stopped: false,
        })))
    }

    /// Queue one answer.
    pub fn push(&self, result: DetectionResult) {
        locked(&self.0).queue.push_back(result);
    }

    /// Answer returned whenever the queue is empty.
    pub fn set_fallback(&self, result: DetectionResult) {
        locked(&self.0).fallback = result;
    }

    pub fn set_failing(&self, failing: bool) {
        locked(&self.0).failing = failing;
    }

    /// The `target_track_id` of the last [`LOCK_HISTORY_LEN`] `update`
    /// calls, oldest first.
    pub fn requested_locks(&self) -> Vec<Option<u64>> {
        locked(&self.0).requested_locks.iter().copied().collect()
    }

    pub fn update_calls(&self) -> usize {
        locked(&self.0).update_calls
    }

    pub fn is_stopped(&self) -> bool {
        locked(&self.0).stopped
    }
}

impl VisionCollaborator for ScriptedVision {
    fn update(&mut self, target_track_id: Option<u64>) -> Result<DetectionResult, CourierError> {
        let mut s = locked(&self.0);
        s.update_calls += 1;
        if s.requested_locks.len() == LOCK_HISTORY_LEN {
            s.requested_locks.pop_front();
        }
        s.requested_locks.push_back(target_track_id);
        if s.failing {
            return Err(CourierError::perception("vision", "scripted failure"));
        }
        let fallback = s.fallback.clone();
        Ok(s.queue.pop_front().unwrap_or(fallback))
    }

    fn get_frame(&mut self) -> Result<FrameSnapshot, CourierError> {
        let s = locked(&self.0);
        if s.failing {
            return Err(CourierError::perception("vision", "no frame available"));
        }
        Ok(Arc::clone(&s.frame))
    }

    fn stop(&mut self) -> Result<(), CourierError> {
        locked(&self.0).stopped = true;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wake word
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct WakeState {
    listening: bool,
    pending: u32,
    starts: u32,
    stops: u32,
    refuse_start: bool,
}

/// Fires once per [`trigger`][Self::trigger] while listening.
#[derive(Clone, Default)]
pub struct ScriptedWakeWord(Arc<Mutex<WakeState>>);

impl ScriptedWakeWord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one utterance of the wake word.
    pub fn trigger(&self) {
        locked(&self.0).pending += 1;
    }

    /// Make `start_listening` fail, as if the microphone were busy.
    pub fn set_refuse_start(&self, refuse: bool) {
        locked(&self.0).refuse_start = refuse;
    }

    pub fn is_listening(&self) -> bool {
        locked(&self.0).listening
    }

    pub fn starts(&self) -> u32 {
        locked(&self.0).starts
    }

    pub fn stops(&self) -> u32 {
        locked(&self.0).stops
    }
}

impl WakeWordCollaborator for ScriptedWakeWord {
    fn start_listening(&mut self) -> Result<(), CourierError> {
        let mut s = locked(&self.0);
        if s.refuse_start {
            return Err(CourierError::perception("wake_word", "microphone busy"));
        }
        s.listening = true;
        s.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CourierError> {
        let mut s = locked(&self.0);
        s.listening = false;
        s.stops += 1;
        Ok(())
    }

    fn detect(&mut self) -> Result<bool, CourierError> {
        let mut s = locked(&self.0);
        if s.listening && s.pending > 0 {
            s.pending -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Homing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HomingState {
    queue: VecDeque<MarkerDetection>,
    fallback: MarkerDetection,
    calls: usize,
    failing: bool,
}

/// Answers `detect_tag` from a queue, then from a fallback (no marker).
#[derive(Clone, Default)]
pub struct ScriptedHoming(Arc<Mutex<HomingState>>);

impl ScriptedHoming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, marker: MarkerDetection) {
        locked(&self.0).queue.push_back(marker);
    }

    pub fn set_fallback(&self, marker: MarkerDetection) {
        locked(&self.0).fallback = marker;
    }

    pub fn set_failing(&self, failing: bool) {
        locked(&self.0).failing = failing;
    }

    pub fn calls(&self) -> usize {
        locked(&self.0).calls
    }
}

impl HomingCollaborator for ScriptedHoming {
    fn detect_tag(&mut self, _frame: &FrameSnapshot) -> Result<MarkerDetection, CourierError> {
        let mut s = locked(&self.0);
        s.calls += 1;
        if s.failing {
            return Err(CourierError::perception("homing", "scripted failure"));
        }
        let fallback = s.fallback.clone();
        Ok(s.queue.pop_front().unwrap_or(fallback))
    }
}
