//! [`ControlLoop`] – the vehicle's cooperative control loop.
//!
//! One call to [`ControlLoop::tick`] is one iteration:
//!
//! 1. **Interlock** – sample the proximity line through the
//!    [`ProximityGuard`]. A trip outside Idle/Stopped preempts the state
//!    handler for this tick, except during the 180° turn at the start of
//!    ReturningHome, where near-field reflections off the ground are expected.
//! 2. **Dispatch** – run the handler for the current [`OperationalState`].
//! 3. **Recover** – a handler error is logged and resolved by stopping the
//!    motor, centering the steering and returning to Idle. The loop keeps
//!    running.
//!
//! | State | Handler |
//! |---|---|
//! | Idle | center once, keep the wake word listening, wake → follow (or track) |
//! | TrackingUser | wait for a raised arm, lock its track, follow |
//! | FollowingUser | pulsed steering toward the locked person, sweep search when lost |
//! | Stopped | dwell, then return home |
//! | ReturningHome | one-shot 180° turn, then seek the home marker |
//!
//! All waits are `tokio::time::sleep`, so the loop is driven by a paused
//! clock in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_hal::steering::clamp_angle;
use courier_hal::{Rig, Speed};
use courier_kernel::{ProximityGuard, StateMachine};
use courier_perception::bearing::marker_bearing;
use courier_perception::{
    FrameSkip, HomingCollaborator, PerceptionCache, VisionCollaborator, WakeWordCollaborator,
};
use courier_types::{CourierConfig, CourierError, DetectionResult, OperationalState};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::search::SearchBackoff;
use crate::stats::LoopStats;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// The perception collaborators the loop consumes.
pub struct Collaborators {
    pub vision: Box<dyn VisionCollaborator>,
    pub wake_word: Box<dyn WakeWordCollaborator>,
    /// `None` when no marker detector is available; ReturningHome then gives
    /// up straight after the turn.
    pub homing: Option<Box<dyn HomingCollaborator>>,
}

/// Progress through ReturningHome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnLeg {
    /// The 180° turn has not run yet; the interlock is suppressed.
    TurnPending,
    /// Turned around; looking for and driving to the home marker.
    SeekingMarker,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    cfg: CourierConfig,
    rig: Rig,
    collab: Collaborators,
    state: StateMachine,
    guard: ProximityGuard,
    vision_cache: PerceptionCache<DetectionResult>,
    frame_skip: FrameSkip,
    // ── following ─────────────────────────────────────────────────────────────
    target_lock: Option<u64>,
    last_error_angle: f64,
    person_search: SearchBackoff,
    // ── returning home ────────────────────────────────────────────────────────
    return_leg: Option<ReturnLeg>,
    sweep_angle: f64,
    marker_search: SearchBackoff,
    // ──────────────────────────────────────────────────────────────────────────
    wake_listening: bool,
    stats: LoopStats,
}

impl ControlLoop {
    /// Build the loop in Idle. The rig is expected to be stopped and centered
    /// already.
    pub fn new(cfg: CourierConfig, rig: Rig, collab: Collaborators) -> Self {
        if rig.proximity.is_none() {
            warn!("running without a proximity sensor; interlock disabled");
        }
        if collab.homing.is_none() {
            warn!("running without a homing collaborator; return-to-home disabled");
        }
        Self {
            guard: ProximityGuard::new(cfg.proximity.debounce_threshold),
            frame_skip: FrameSkip::new(cfg.perception.frame_skip_interval),
            person_search: SearchBackoff::new(cfg.search.person),
            marker_search: SearchBackoff::new(cfg.search.marker),
            sweep_angle: cfg.homing.sweep_angle_deg,
            stats: LoopStats::new(cfg.timing.stats_every_ticks),
            state: StateMachine::new(OperationalState::Idle),
            vision_cache: PerceptionCache::new(),
            target_lock: None,
            last_error_angle: 0.0,
            return_leg: None,
            wake_listening: false,
            cfg,
            rig,
            collab,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> OperationalState {
        self.state.current()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    pub fn target_lock(&self) -> Option<u64> {
        self.target_lock
    }

    pub fn return_leg(&self) -> Option<ReturnLeg> {
        self.return_leg
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    pub fn ticks(&self) -> u64 {
        self.stats.ticks()
    }

    // -------------------------------------------------------------------------
    // Loop
    // -------------------------------------------------------------------------

    /// Tick until `running` is cleared, sleeping the configured tick interval
    /// in between. Does not shut the peripherals down.
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!(state = ?self.state(), "control loop started");
        let interval = self.cfg.timing.tick_interval();
        while running.load(Ordering::Acquire) {
            self.tick().await;
            sleep(interval).await;
        }
        info!(ticks = self.ticks(), "control loop stopped");
    }

    /// One iteration: interlock, then the current state's handler.
    pub async fn tick(&mut self) {
        let state = self.state.current();
        let tripped = self.sample_proximity();

        let turning = state == OperationalState::ReturningHome
            && self.return_leg != Some(ReturnLeg::SeekingMarker);
        let armed = !matches!(state, OperationalState::Idle | OperationalState::Stopped);

        let result = if tripped && armed && !turning {
            self.on_interlock(state).await
        } else {
            if tripped && turning {
                debug!("interlock suppressed during the 180 degree turn");
            }
            self.dispatch(state).await
        };

        if let Err(e) = result {
            self.recover(state, e);
        }

        if let Some(rate) = self.stats.record(Instant::now()) {
            debug!(
                hz = rate.hz,
                min_hz = rate.min_hz,
                max_hz = rate.max_hz,
                "control loop rate"
            );
        }
    }

    /// Stop, center, then stop and release every peripheral. Each step's
    /// failure is logged and the rest still runs.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        if let Err(e) = self.rig.motor.stop() {
            warn!(error = %e, "motor stop failed during shutdown");
        }
        if let Err(e) = self.rig.steering.center() {
            warn!(error = %e, "steering center failed during shutdown");
        }
        if let Err(e) = self.collab.wake_word.stop() {
            warn!(error = %e, "wake word stop failed during shutdown");
        }
        self.wake_listening = false;
        if let Err(e) = self.collab.vision.stop() {
            warn!(error = %e, "vision stop failed during shutdown");
        }
        if let Err(e) = self.rig.motor.release() {
            warn!(error = %e, "motor release failed during shutdown");
        }
        if let Err(e) = self.rig.steering.release() {
            warn!(error = %e, "steering release failed during shutdown");
        }
        info!("shutdown complete");
    }

    // -------------------------------------------------------------------------
    // Interlock
    // -------------------------------------------------------------------------

    fn sample_proximity(&mut self) -> bool {
        let Some(sensor) = self.rig.proximity.as_mut() else {
            return false;
        };
        let raw = match sensor.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "proximity read failed; treating as too close");
                true
            }
        };
        self.guard.sample(raw)
    }

    async fn on_interlock(&mut self, state: OperationalState) -> Result<(), CourierError> {
        warn!(state = ?state, "proximity interlock tripped");
        if state == OperationalState::ReturningHome {
            // Tripped on the way home: back off and turn around.
            self.rig.motor.stop()?;
            sleep(self.cfg.timing.interlock_recovery_pause()).await;
            self.turn_in_place(self.cfg.homing.turn_angle_deg, self.cfg.timing.turn_duration())
                .await?;
            return self.enter(OperationalState::Idle);
        }

        self.rig.motor.stop()?;
        self.rig.steering.center()?;
        let next = if state.is_movement() {
            OperationalState::Stopped
        } else {
            OperationalState::Idle
        };
        self.enter(next)?;
        sleep(self.cfg.timing.interlock_settle()).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Transition and run the entry action of `next`.
    fn enter(&mut self, next: OperationalState) -> Result<(), CourierError> {
        self.state.transition_to(next);
        self.return_leg = None;
        match next {
            OperationalState::FollowingUser => {
                info!("starting motor at medium speed");
                self.rig.motor.drive(Speed::Medium)?;
            }
            OperationalState::Stopped => {
                self.person_search.reset();
                self.marker_search.reset();
            }
            OperationalState::ReturningHome => {
                self.return_leg = Some(ReturnLeg::TurnPending);
            }
            OperationalState::Idle | OperationalState::TrackingUser => {}
        }
        Ok(())
    }

    fn recover(&mut self, state: OperationalState, err: CourierError) {
        error!(state = ?state, error = %err, "state handler failed; stopping and returning to idle");
        if let Err(e) = self.rig.motor.stop() {
            warn!(error = %e, "motor stop failed during recovery");
        }
        if let Err(e) = self.rig.steering.center() {
            warn!(error = %e, "steering center failed during recovery");
        }
        if let Err(e) = self.enter(OperationalState::Idle) {
            warn!(error = %e, "entering idle failed during recovery");
        }
    }

    // -------------------------------------------------------------------------
    // Handlers
    // -------------------------------------------------------------------------

    async fn dispatch(&mut self, state: OperationalState) -> Result<(), CourierError> {
        match state {
            OperationalState::Idle => self.handle_idle().await,
            OperationalState::TrackingUser => self.handle_tracking(),
            OperationalState::FollowingUser => self.handle_following().await,
            OperationalState::Stopped => self.handle_stopped(),
            OperationalState::ReturningHome => self.handle_returning_home().await,
        }
    }

    async fn handle_idle(&mut self) -> Result<(), CourierError> {
        if !self.rig.steering.is_centered() {
            self.rig.steering.center()?;
        }

        if !self.wake_listening {
            if let Err(e) = self.collab.wake_word.start_listening() {
                warn!(error = %e, "wake word detector failed to start");
                sleep(self.cfg.timing.wake_retry_pause()).await;
                return Ok(());
            }
            self.wake_listening = true;
            info!("wake word detector listening");
        }

        if self.collab.wake_word.detect()? {
            info!("wake word detected");
            // Frees the microphone for whatever runs next.
            match self.collab.wake_word.stop() {
                Ok(()) => self.wake_listening = false,
                Err(e) => warn!(error = %e, "wake word detector failed to stop"),
            }
            let next = if self.cfg.behavior.require_arm_raise {
                OperationalState::TrackingUser
            } else {
                OperationalState::FollowingUser
            };
            self.enter(next)?;
        }
        Ok(())
    }

    fn handle_tracking(&mut self) -> Result<(), CourierError> {
        if self.state.is_timeout(self.cfg.timing.tracking_timeout()) {
            info!("no raised arm seen before the tracking timeout");
            self.rig.motor.stop()?;
            self.rig.steering.center()?;
            return self.enter(OperationalState::Idle);
        }

        let detection = self.poll_vision(None)?;
        if detection.arm_raised {
            self.target_lock = detection.track_id;
            info!(track_id = ?detection.track_id, angle = ?detection.angle, "arm raised; following");
            self.enter(OperationalState::FollowingUser)?;
        }
        Ok(())
    }

    async fn handle_following(&mut self) -> Result<(), CourierError> {
        let mut detection = self.poll_vision(self.target_lock)?;
        match self.target_lock {
            Some(lock) if detection.track_id != Some(lock) => {
                detection.person_detected = false;
            }
            None if detection.person_detected => {
                if let Some(id) = detection.track_id {
                    info!(track_id = id, "target locked");
                    self.target_lock = Some(id);
                }
            }
            _ => {}
        }

        if !detection.person_detected {
            return self.search_for_person().await;
        }

        let timing = self.cfg.timing;
        match detection.angle {
            Some(angle) => {
                self.person_search.reset();
                let angle = clamp_angle(angle);
                // Pulse the correction rather than holding it.
                self.rig.steering.set_angle(angle)?;
                self.last_error_angle = angle;
                sleep(timing.steering_pulse()).await;
                self.rig.steering.center()?;

                if detection.is_centered {
                    debug!(angle, "person centered; full speed");
                    self.rig.motor.drive(Speed::Fast)?;
                    sleep(timing.forward_hold()).await;
                } else {
                    debug!(angle, "person off center; medium speed");
                    self.rig.motor.drive(Speed::Medium)?;
                }
            }
            None => {
                debug!("person detected without a bearing; approaching slowly");
                self.rig.motor.drive(Speed::Slow)?;
                if !self.rig.steering.is_centered() {
                    self.rig.steering.center()?;
                }
            }
        }
        Ok(())
    }

    async fn search_for_person(&mut self) -> Result<(), CourierError> {
        let sweep = -2.0 * self.last_error_angle;
        info!(sweep, wait = ?self.person_search.wait(), "person lost; sweeping the other way");
        self.rig.motor.drive(Speed::Slow)?;
        self.rig.steering.set_angle(sweep)?;
        self.last_error_angle = -self.last_error_angle;
        self.target_lock = None;
        sleep(self.person_search.wait()).await;
        self.person_search.grow();
        Ok(())
    }

    fn handle_stopped(&mut self) -> Result<(), CourierError> {
        if self.state.is_timeout(self.cfg.timing.stopped_dwell()) {
            info!("dwell complete; returning home");
            self.enter(OperationalState::ReturningHome)?;
        }
        Ok(())
    }

    async fn handle_returning_home(&mut self) -> Result<(), CourierError> {
        if self.return_leg != Some(ReturnLeg::SeekingMarker) {
            info!("returning home: turning 180 degrees");
            self.rig.motor.stop()?;
            self.turn_in_place(self.cfg.homing.turn_angle_deg, self.cfg.timing.turn_duration())
                .await?;
            sleep(self.cfg.timing.turn_settle()).await;
            self.return_leg = Some(ReturnLeg::SeekingMarker);
            info!("turn complete; scanning for the home marker");
            return Ok(());
        }

        let Some(homing) = self.collab.homing.as_mut() else {
            warn!("no homing collaborator; cannot return home");
            self.rig.motor.stop()?;
            self.rig.steering.center()?;
            return self.enter(OperationalState::Idle);
        };
        let frame = self.collab.vision.get_frame()?;
        let marker = homing.detect_tag(&frame)?;

        if !marker.detected {
            let sweep = self.sweep_angle;
            info!(sweep, wait = ?self.marker_search.wait(), "home marker not found; sweeping");
            self.rig.motor.drive(Speed::Medium)?;
            self.rig.steering.set_angle(sweep)?;
            self.sweep_angle = -sweep;
            sleep(self.marker_search.wait()).await;
            self.marker_search.grow();
            return Ok(());
        }

        self.marker_search.reset();
        let stop_distance = self.cfg.homing.stop_distance_m;
        if let Some(distance) = marker.distance_m.filter(|d| *d < stop_distance) {
            info!(distance_m = distance, tag_id = ?marker.tag_id, "reached the home marker");
            self.rig.motor.stop()?;
            sleep(self.cfg.timing.home_approach_pause()).await;
            self.turn_in_place(
                self.cfg.homing.reverse_turn_angle_deg,
                self.cfg.timing.home_turn_duration(),
            )
            .await?;
            return self.enter(OperationalState::Idle);
        }

        let perception = self.cfg.perception;
        let angle = clamp_angle(marker_bearing(
            &marker,
            perception.camera_width,
            perception.horizontal_fov_deg,
        ));
        self.rig.steering.set_angle(angle)?;
        let speed = if marker.is_centered {
            Speed::Medium
        } else {
            Speed::Slow
        };
        self.rig.motor.drive(speed)?;
        debug!(angle, distance_m = ?marker.distance_m, centered = marker.is_centered, "driving toward the home marker");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Hold `angle_deg` at turn speed for `duration`, then center and stop.
    async fn turn_in_place(
        &mut self,
        angle_deg: f64,
        duration: std::time::Duration,
    ) -> Result<(), CourierError> {
        self.rig.steering.set_angle(angle_deg)?;
        self.rig.motor.drive(Speed::Turn)?;
        sleep(duration).await;
        self.rig.steering.center()?;
        self.rig.motor.stop()
    }

    fn poll_vision(&mut self, lock: Option<u64>) -> Result<DetectionResult, CourierError> {
        let refresh = self.frame_skip.advance();
        let ttl = self.cfg.perception.cache_ttl();
        let vision = &mut self.collab.vision;
        self.vision_cache
            .get_or_refresh(Instant::now(), ttl, refresh, || vision.update(lock))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use courier_hal::sim::{SimProbes, SimRig};
    use courier_hal::steering::steering_duty;
    use courier_perception::sim::{ScriptedHoming, ScriptedVision, ScriptedWakeWord};
    use courier_types::MarkerDetection;

    struct Harness {
        ctl: ControlLoop,
        cfg: CourierConfig,
        probes: SimProbes,
        vision: ScriptedVision,
        wake: ScriptedWakeWord,
        homing: ScriptedHoming,
    }

    impl Harness {
        fn proximity(&self, too_close: bool) {
            self.probes
                .proximity
                .as_ref()
                .expect("sim rig has a proximity probe")
                .set(too_close);
        }

        fn steering_saw(&self, angle: f64) -> bool {
            let duty = steering_duty(&self.cfg.steering, angle);
            self.probes
                .steering
                .history()
                .iter()
                .any(|d| (d - duty).abs() < 1e-9)
        }

        /// Run one tick and report how long it held the loop.
        async fn timed_tick(&mut self) -> Duration {
            let t0 = Instant::now();
            self.ctl.tick().await;
            t0.elapsed()
        }

        /// Idle → FollowingUser through the wake word.
        async fn wake_up(&mut self) {
            self.wake.trigger();
            self.ctl.tick().await;
            assert_eq!(self.ctl.state(), OperationalState::FollowingUser);
        }

        /// Following → Stopped → (dwell) → ReturningHome.
        async fn head_home(&mut self) {
            self.wake_up().await;
            self.proximity(true);
            self.ctl.tick().await;
            assert_eq!(self.ctl.state(), OperationalState::Stopped);
            self.proximity(false);
            tokio::time::advance(self.cfg.timing.stopped_dwell() + Duration::from_millis(1)).await;
            self.ctl.tick().await;
            assert_eq!(self.ctl.state(), OperationalState::ReturningHome);
        }
    }

    /// Defaults, except every poll may refresh the vision cache.
    fn test_config() -> CourierConfig {
        let mut cfg = CourierConfig::default();
        cfg.perception.frame_skip_interval = 1;
        cfg
    }

    fn harness_with(cfg: CourierConfig) -> Harness {
        let (rig, probes) = SimRig::new().build(&cfg).unwrap();
        let vision = ScriptedVision::new();
        let wake = ScriptedWakeWord::new();
        let homing = ScriptedHoming::new();
        let ctl = ControlLoop::new(
            cfg.clone(),
            rig,
            Collaborators {
                vision: Box::new(vision.clone()),
                wake_word: Box::new(wake.clone()),
                homing: Some(Box::new(homing.clone())),
            },
        );
        Harness {
            ctl,
            cfg,
            probes,
            vision,
            wake,
            homing,
        }
    }

    fn harness() -> Harness {
        harness_with(test_config())
    }

    // ── Idle ────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn wake_word_starts_following_at_medium_speed() {
        let mut h = harness();
        h.wake_up().await;

        assert!(h.ctl.rig().steering.is_centered());
        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.02).abs() < 1e-9);
        assert_eq!(h.wake.starts(), 1);
        assert_eq!(h.wake.stops(), 1);
        assert!(!h.wake.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_without_wake_word_stays_idle_and_listening() {
        let mut h = harness();
        h.ctl.tick().await;
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert!(h.wake.is_listening());
        assert_eq!(h.wake.starts(), 1);
        // Already centered at startup, so Idle issues no steering command.
        assert_eq!(h.probes.steering.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_backs_off_when_wake_word_cannot_start() {
        let mut h = harness();
        h.wake.set_refuse_start(true);
        h.wake.trigger();
        let before = Instant::now();
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert!(before.elapsed() >= Duration::from_millis(500));

        h.wake.set_refuse_start(false);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::FollowingUser);
    }

    // ── FollowingUser ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn centered_detection_locks_target_and_drives_fast() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.push(DetectionResult::person(7, 10.0, true));
        h.ctl.tick().await;

        assert_eq!(h.ctl.target_lock(), Some(7));
        assert!(h.steering_saw(10.0));
        assert!(h.ctl.rig().steering.is_centered());
        assert_eq!(h.ctl.rig().motor.duty(), 76.0);
        assert_eq!(h.vision.requested_locks(), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn off_center_detection_drives_medium() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.push(DetectionResult::person(3, -60.0, false));
        h.ctl.tick().await;

        assert!(h.steering_saw(-45.0));
        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.02).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn detection_without_bearing_approaches_slowly() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.push(DetectionResult {
            person_detected: true,
            track_id: Some(4),
            ..Default::default()
        });
        h.ctl.tick().await;

        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.05).abs() < 1e-9);
        assert!(h.ctl.rig().steering.is_centered());
        assert_eq!(h.ctl.target_lock(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn different_track_is_treated_as_lost() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.push(DetectionResult::person(7, 10.0, true));
        h.ctl.tick().await;
        assert_eq!(h.ctl.target_lock(), Some(7));

        h.vision.push(DetectionResult::person(9, 0.0, true));
        h.ctl.tick().await;

        assert_eq!(h.ctl.target_lock(), None);
        assert_eq!(h.ctl.rig().steering.angle(), -20.0);
        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.05).abs() < 1e-9);
        assert_eq!(h.vision.requested_locks(), vec![None, Some(7)]);
        assert_eq!(h.ctl.state(), OperationalState::FollowingUser);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_lost_ticks_sweep_in_opposite_directions() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.push(DetectionResult::person(7, 12.0, false));
        h.ctl.tick().await;

        h.ctl.tick().await;
        let first = h.ctl.rig().steering.angle();
        h.ctl.tick().await;
        let second = h.ctl.rig().steering.angle();

        assert_eq!(first, -24.0);
        assert_eq!(second, 24.0);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_search_waits_longer_each_time() {
        let mut h = harness();
        h.wake_up().await;

        let t0 = Instant::now();
        h.ctl.tick().await;
        let first = t0.elapsed();
        let t1 = Instant::now();
        h.ctl.tick().await;
        let second = t1.elapsed();

        assert!(first >= Duration::from_millis(149) && first < Duration::from_millis(200));
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn person_search_wait_resets_once_the_person_is_seen_again() {
        let mut h = harness();
        h.wake_up().await;

        let first = h.timed_tick().await;
        let second = h.timed_tick().await;
        assert!(first >= Duration::from_millis(149) && first < Duration::from_millis(200));
        assert!(second >= Duration::from_millis(249));

        h.vision.push(DetectionResult::person(7, 10.0, false));
        h.ctl.tick().await;
        assert_eq!(h.ctl.target_lock(), Some(7));

        let after = h.timed_tick().await;
        assert!(after >= Duration::from_millis(149) && after < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cached_detection_is_reused_between_refreshes() {
        let mut cfg = CourierConfig::default();
        cfg.perception.frame_skip_interval = 3;
        let mut h = harness_with(cfg);
        h.wake_up().await;
        h.vision.set_fallback(DetectionResult::person(5, 0.0, false));

        h.ctl.tick().await;
        h.ctl.tick().await;
        h.ctl.tick().await;
        assert_eq!(h.vision.update_calls(), 1);
        h.ctl.tick().await;
        assert_eq!(h.vision.update_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn vision_failure_stops_and_returns_to_idle() {
        let mut h = harness();
        h.wake_up().await;
        h.vision.set_failing(true);
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(h.ctl.rig().steering.is_centered());
    }

    // ── Interlock ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn proximity_trip_while_following_stops() {
        let mut h = harness();
        h.wake_up().await;
        h.proximity(true);
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Stopped);
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(h.ctl.rig().steering.is_centered());
        assert_eq!(h.vision.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn proximity_read_failure_trips_the_interlock() {
        let mut h = harness();
        h.wake_up().await;
        h.probes.proximity.as_ref().unwrap().set_failing(true);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn proximity_is_ignored_in_idle() {
        let mut h = harness();
        h.proximity(true);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert!(h.wake.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_threshold_delays_the_trip() {
        let mut cfg = test_config();
        cfg.proximity.debounce_threshold = 3;
        let mut h = harness_with(cfg);
        h.wake_up().await;
        h.proximity(true);
        h.ctl.tick().await;
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::FollowingUser);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_without_a_proximity_sensor() {
        let cfg = test_config();
        let (rig, _probes) = SimRig::new().without_proximity().build(&cfg).unwrap();
        let wake = ScriptedWakeWord::new();
        let mut ctl = ControlLoop::new(
            cfg,
            rig,
            Collaborators {
                vision: Box::new(ScriptedVision::new()),
                wake_word: Box::new(wake.clone()),
                homing: None,
            },
        );
        wake.trigger();
        ctl.tick().await;
        ctl.tick().await;
        assert_eq!(ctl.state(), OperationalState::FollowingUser);
    }

    // ── Stopped / ReturningHome ─────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn stopped_dwell_leads_home() {
        let mut h = harness();
        h.wake_up().await;
        h.proximity(true);
        h.ctl.tick().await;
        h.proximity(false);

        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Stopped);

        tokio::time::advance(Duration::from_secs(4)).await;
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::ReturningHome);
        assert_eq!(h.ctl.return_leg(), Some(ReturnLeg::TurnPending));
    }

    #[tokio::test(start_paused = true)]
    async fn first_return_tick_turns_around_even_when_tripped() {
        let mut h = harness();
        h.head_home().await;
        h.proximity(true);

        let t0 = Instant::now();
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::ReturningHome);
        assert_eq!(h.ctl.return_leg(), Some(ReturnLeg::SeekingMarker));
        assert!(h.steering_saw(-45.0));
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(t0.elapsed() >= Duration::from_secs_f64(3.4 + 0.5));
        assert_eq!(h.homing.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_the_marker_turns_and_goes_idle() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;
        h.probes.steering.clear();

        h.homing.push(MarkerDetection {
            detected: true,
            center_x: 320,
            distance_m: Some(0.2),
            tag_id: Some(0),
            is_centered: true,
            ..Default::default()
        });
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert_eq!(h.ctl.return_leg(), None);
        assert!(h.steering_saw(-22.5));
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(h.ctl.rig().steering.is_centered());
    }

    #[tokio::test(start_paused = true)]
    async fn distant_marker_is_approached_using_pixel_bearing() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;

        h.homing.push(MarkerDetection {
            detected: true,
            center_x: 480,
            distance_m: Some(2.0),
            is_centered: false,
            ..Default::default()
        });
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::ReturningHome);
        assert_eq!(h.ctl.rig().steering.angle(), 22.5);
        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.05).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_marker_sweeps_left_and_right() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;

        h.ctl.tick().await;
        assert_eq!(h.ctl.rig().steering.angle(), 20.0);
        assert!((h.ctl.rig().motor.duty() - 76.0 * 1.02).abs() < 1e-9);
        h.ctl.tick().await;
        assert_eq!(h.ctl.rig().steering.angle(), -20.0);
        assert_eq!(h.homing.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn marker_search_wait_resets_once_the_marker_is_seen_again() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;

        let first = h.timed_tick().await;
        let second = h.timed_tick().await;
        assert!(first >= Duration::from_millis(849) && first < Duration::from_millis(900));
        assert!(second >= Duration::from_millis(1849));

        h.homing.push(MarkerDetection {
            detected: true,
            center_x: 320,
            distance_m: Some(2.0),
            is_centered: true,
            ..Default::default()
        });
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::ReturningHome);

        let after = h.timed_tick().await;
        assert!(after >= Duration::from_millis(849) && after < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn entering_stopped_resets_both_search_waits() {
        let mut h = harness();
        h.wake_up().await;
        for _ in 0..3 {
            h.ctl.tick().await;
        }

        // First delivery: grow the marker wait, then abort home via the interlock.
        h.proximity(true);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Stopped);
        h.proximity(false);
        tokio::time::advance(h.cfg.timing.stopped_dwell() + Duration::from_millis(1)).await;
        h.ctl.tick().await;
        h.ctl.tick().await;
        h.ctl.tick().await;
        h.ctl.tick().await;
        assert_eq!(h.homing.calls(), 2);
        h.proximity(true);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Idle);
        h.proximity(false);

        // Second delivery: the person wait is back at its base...
        h.wake_up().await;
        let lost = h.timed_tick().await;
        assert!(lost >= Duration::from_millis(149) && lost < Duration::from_millis(200));

        // ...and so is the marker wait once Stopped is entered again.
        h.proximity(true);
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Stopped);
        h.proximity(false);
        tokio::time::advance(h.cfg.timing.stopped_dwell() + Duration::from_millis(1)).await;
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::ReturningHome);
        h.ctl.tick().await;
        let sweep = h.timed_tick().await;
        assert!(sweep >= Duration::from_millis(849) && sweep < Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn trip_after_turn_runs_recovery_turn_to_idle() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;
        h.probes.steering.clear();

        h.proximity(true);
        let t0 = Instant::now();
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert_eq!(h.ctl.return_leg(), None);
        assert!(h.steering_saw(-45.0));
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(t0.elapsed() >= Duration::from_secs_f64(5.0 + 3.4));
        assert_eq!(h.homing.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn homing_failure_returns_to_idle() {
        let mut h = harness();
        h.head_home().await;
        h.ctl.tick().await;
        h.homing.set_failing(true);
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Idle);
        assert_eq!(h.ctl.return_leg(), None);
        assert!(h.ctl.rig().motor.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn no_homing_collaborator_gives_up_after_turn() {
        let cfg = test_config();
        let (rig, probes) = SimRig::new().build(&cfg).unwrap();
        let wake = ScriptedWakeWord::new();
        let mut ctl = ControlLoop::new(
            cfg.clone(),
            rig,
            Collaborators {
                vision: Box::new(ScriptedVision::new()),
                wake_word: Box::new(wake.clone()),
                homing: None,
            },
        );
        wake.trigger();
        ctl.tick().await;
        probes.proximity.as_ref().unwrap().set(true);
        ctl.tick().await;
        probes.proximity.as_ref().unwrap().set(false);
        tokio::time::advance(Duration::from_secs(5)).await;
        ctl.tick().await;
        assert_eq!(ctl.state(), OperationalState::ReturningHome);

        ctl.tick().await;
        ctl.tick().await;
        assert_eq!(ctl.state(), OperationalState::Idle);
    }

    // ── TrackingUser ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn arm_raise_gate_tracks_then_follows_locked_person() {
        let mut cfg = test_config();
        cfg.behavior.require_arm_raise = true;
        let mut h = harness_with(cfg);
        h.wake.trigger();
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::TrackingUser);
        assert!(h.ctl.rig().motor.is_stopped());

        h.vision.push(DetectionResult::person(11, 0.0, true));
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::TrackingUser);

        // Let the cached answer expire.
        tokio::time::advance(Duration::from_millis(150)).await;
        h.vision.push(DetectionResult::person(11, 0.0, true).with_arm_raised());
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::FollowingUser);
        assert_eq!(h.ctl.target_lock(), Some(11));
        assert_eq!(h.vision.requested_locks(), vec![None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn proximity_trip_while_tracking_stops() {
        let mut cfg = test_config();
        cfg.behavior.require_arm_raise = true;
        let mut h = harness_with(cfg);
        h.wake.trigger();
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::TrackingUser);

        h.proximity(true);
        h.ctl.tick().await;

        assert_eq!(h.ctl.state(), OperationalState::Stopped);
        assert_eq!(h.ctl.state_machine().previous(), OperationalState::TrackingUser);
        assert!(h.ctl.rig().motor.is_stopped());
        assert!(h.ctl.rig().steering.is_centered());
        assert_eq!(h.vision.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_times_out_to_idle() {
        let mut cfg = test_config();
        cfg.behavior.require_arm_raise = true;
        let mut h = harness_with(cfg);
        h.wake.trigger();
        h.ctl.tick().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        h.ctl.tick().await;
        assert_eq!(h.ctl.state(), OperationalState::Idle);
    }

    // ── run / shutdown ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn run_exits_when_flag_clears() {
        let mut h = harness();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            flag.store(false, Ordering::Release);
        });

        h.ctl.run(running).await;
        assert!(h.ctl.ticks() > 0);
        assert_eq!(h.ctl.state(), OperationalState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything_and_keeps_going_on_errors() {
        let mut h = harness();
        h.wake_up().await;
        h.probes.motor.set_failing(true);
        h.ctl.shutdown();

        assert!(!h.probes.motor.released());
        assert!(h.probes.steering.released());
        assert!(h.ctl.rig().steering.is_centered());
        assert!(h.vision.is_stopped());
        assert_eq!(h.wake.stops(), 2);
    }
}
