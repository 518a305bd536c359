//! [`CourierConfig`] – the single configuration tree of the vehicle.
//!
//! Built once at startup (usually from `~/.courier/config.toml`), validated,
//! and passed section by section into each component constructor. Every
//! section carries `#[serde(default)]`, so a TOML file only needs to name the
//! values it overrides.
//!
//! Durations are stored as `f64` seconds in fields ending in `_secs` and read
//! back through the `Duration` accessors.
//!
//! # Example
//!
//! ```
//! use courier_types::CourierConfig;
//!
//! let cfg = CourierConfig::default();
//! assert!(cfg.validate().is_ok());
//! assert_eq!(cfg.perception.frame_skip_interval, 3);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CourierError;

fn secs(v: f64) -> Duration {
    Duration::try_from_secs_f64(v).unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Root
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub motor: MotorConfig,
    pub steering: SteeringConfig,
    pub proximity: ProximityConfig,
    pub timing: TimingConfig,
    pub perception: PerceptionConfig,
    pub homing: HomingConfig,
    pub search: SearchConfig,
    pub behavior: BehaviorConfig,
    pub hardware: HardwareConfig,
}

impl CourierConfig {
    /// Reject values that would make the controller behave inconsistently.
    ///
    /// Out-of-range *commands* are clamped at run time; this only checks the
    /// calibration itself.
    pub fn validate(&self) -> Result<(), CourierError> {
        let (m, st, h) = (&self.motor, &self.steering, &self.homing);
        let calibration = [
            ("motor.frequency_hz", m.frequency_hz),
            ("motor.stop_duty", m.stop_duty),
            ("motor.max_forward_duty", m.max_forward_duty),
            ("motor.reverse_threshold", m.reverse_threshold),
            ("motor.slow", m.slow),
            ("motor.medium", m.medium),
            ("motor.fast", m.fast),
            ("motor.turn", m.turn),
            ("steering.frequency_hz", st.frequency_hz),
            ("steering.center_duty", st.center_duty),
            ("steering.left_max_duty", st.left_max_duty),
            ("steering.right_max_duty", st.right_max_duty),
            ("homing.stop_distance_m", h.stop_distance_m),
            ("homing.sweep_angle_deg", h.sweep_angle_deg),
            ("homing.turn_angle_deg", h.turn_angle_deg),
            ("homing.reverse_turn_angle_deg", h.reverse_turn_angle_deg),
            ("perception.horizontal_fov_deg", self.perception.horizontal_fov_deg),
        ];
        for (name, v) in calibration {
            if !v.is_finite() {
                return Err(CourierError::Config(format!(
                    "{name} must be a finite number (got {v})"
                )));
            }
        }
        if m.reverse_threshold >= m.stop_duty {
            return Err(CourierError::Config(format!(
                "motor.reverse_threshold ({}) must be below motor.stop_duty ({})",
                m.reverse_threshold, m.stop_duty
            )));
        }
        if m.frequency_hz <= 0.0 || self.steering.frequency_hz <= 0.0 {
            return Err(CourierError::Config(
                "PWM frequencies must be positive".to_string(),
            ));
        }
        if self.proximity.debounce_threshold == 0 {
            return Err(CourierError::Config(
                "proximity.debounce_threshold must be at least 1".to_string(),
            ));
        }
        if self.perception.frame_skip_interval == 0 {
            return Err(CourierError::Config(
                "perception.frame_skip_interval must be at least 1".to_string(),
            ));
        }
        if self.perception.camera_width == 0 || self.perception.horizontal_fov_deg <= 0.0 {
            return Err(CourierError::Config(
                "perception.camera_width and perception.horizontal_fov_deg must be positive"
                    .to_string(),
            ));
        }
        for (name, b) in [("person", &self.search.person), ("marker", &self.search.marker)] {
            if b.cap_secs < b.base_secs {
                return Err(CourierError::Config(format!(
                    "search.{name}.cap_secs must not be below search.{name}.base_secs"
                )));
            }
        }
        let durations = [
            ("timing.tick_interval_secs", self.timing.tick_interval_secs),
            ("timing.stopped_dwell_secs", self.timing.stopped_dwell_secs),
            ("timing.turn_duration_secs", self.timing.turn_duration_secs),
            ("timing.tracking_timeout_secs", self.timing.tracking_timeout_secs),
            ("timing.steering_pulse_secs", self.timing.steering_pulse_secs),
            ("timing.forward_hold_secs", self.timing.forward_hold_secs),
            ("timing.turn_settle_secs", self.timing.turn_settle_secs),
            ("timing.home_approach_pause_secs", self.timing.home_approach_pause_secs),
            ("timing.home_turn_trim_secs", self.timing.home_turn_trim_secs),
            ("timing.interlock_settle_secs", self.timing.interlock_settle_secs),
            ("timing.interlock_recovery_pause_secs", self.timing.interlock_recovery_pause_secs),
            ("timing.wake_retry_pause_secs", self.timing.wake_retry_pause_secs),
            ("timing.startup_settle_secs", self.timing.startup_settle_secs),
            ("perception.cache_ttl_secs", self.perception.cache_ttl_secs),
            ("search.person.base_secs", self.search.person.base_secs),
            ("search.person.step_secs", self.search.person.step_secs),
            ("search.person.extra_secs", self.search.person.extra_secs),
            ("search.marker.base_secs", self.search.marker.base_secs),
            ("search.marker.step_secs", self.search.marker.step_secs),
            ("search.marker.extra_secs", self.search.marker.extra_secs),
        ];
        for (name, v) in durations {
            if !v.is_finite() || v < 0.0 {
                return Err(CourierError::Config(format!(
                    "{name} must be a finite, non-negative number of seconds (got {v})"
                )));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Actuators
// ────────────────────────────────────────────────────────────────────────────

/// Drive motor calibration.
///
/// The motor driver is inverted: `stop_duty` (100 %) means stopped and lower
/// duty means faster, down to `reverse_threshold`, below which the driver
/// would switch into reverse. Speed multipliers scale `max_forward_duty`, so
/// a multiplier above 1.0 is *slower* than full speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub frequency_hz: f64,
    pub stop_duty: f64,
    pub max_forward_duty: f64,
    pub reverse_threshold: f64,
    pub slow: f64,
    pub medium: f64,
    pub fast: f64,
    pub turn: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 40.0,
            stop_duty: 100.0,
            max_forward_duty: 76.0,
            reverse_threshold: 65.0,
            slow: 1.05,
            medium: 1.02,
            fast: 1.0,
            turn: 0.91,
        }
    }
}

/// Steering servo calibration for the ±45° range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub frequency_hz: f64,
    pub center_duty: f64,
    pub left_max_duty: f64,
    pub right_max_duty: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            center_duty: 92.6,
            left_max_duty: 95.422,
            right_max_duty: 89.318,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Safety
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Consecutive raw `true` samples required before the interlock trips.
    pub debounce_threshold: u32,
    /// Whether a high line level means "object too close".
    pub active_high: bool,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            debounce_threshold: 1,
            active_high: true,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Timing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Sleep between two control-loop ticks.
    pub tick_interval_secs: f64,
    /// Interaction dwell in Stopped before heading home.
    pub stopped_dwell_secs: f64,
    /// Duration of the 180° turn-in-place maneuver.
    pub turn_duration_secs: f64,
    /// Give up waiting for a raised arm in TrackingUser after this long.
    pub tracking_timeout_secs: f64,
    /// How long a steering correction is held before re-centering.
    pub steering_pulse_secs: f64,
    /// Forward hold after a centered detection.
    pub forward_hold_secs: f64,
    /// Pause after the one-shot turn completes.
    pub turn_settle_secs: f64,
    /// Pause between stopping at the home marker and turning around.
    pub home_approach_pause_secs: f64,
    /// Subtracted from `turn_duration_secs` for the turn at the home marker.
    pub home_turn_trim_secs: f64,
    /// Pause after an ordinary interlock stop.
    pub interlock_settle_secs: f64,
    /// Pause before the recovery turn when the interlock trips on the way home.
    pub interlock_recovery_pause_secs: f64,
    /// Back-off when the wake-word collaborator refuses to start.
    pub wake_retry_pause_secs: f64,
    /// Settle time after centering the steering at startup.
    pub startup_settle_secs: f64,
    /// Log loop throughput every this many ticks.
    pub stats_every_ticks: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 0.01,
            stopped_dwell_secs: 4.0,
            turn_duration_secs: 3.4,
            tracking_timeout_secs: 30.0,
            steering_pulse_secs: 0.15,
            forward_hold_secs: 0.5,
            turn_settle_secs: 0.5,
            home_approach_pause_secs: 1.0,
            home_turn_trim_secs: 0.2,
            interlock_settle_secs: 0.05,
            interlock_recovery_pause_secs: 5.0,
            wake_retry_pause_secs: 0.5,
            startup_settle_secs: 3.0,
            stats_every_ticks: 500,
        }
    }
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        secs(self.tick_interval_secs)
    }
    pub fn stopped_dwell(&self) -> Duration {
        secs(self.stopped_dwell_secs)
    }
    pub fn turn_duration(&self) -> Duration {
        secs(self.turn_duration_secs)
    }
    pub fn tracking_timeout(&self) -> Duration {
        secs(self.tracking_timeout_secs)
    }
    pub fn steering_pulse(&self) -> Duration {
        secs(self.steering_pulse_secs)
    }
    pub fn forward_hold(&self) -> Duration {
        secs(self.forward_hold_secs)
    }
    pub fn turn_settle(&self) -> Duration {
        secs(self.turn_settle_secs)
    }
    pub fn home_approach_pause(&self) -> Duration {
        secs(self.home_approach_pause_secs)
    }
    /// Turn duration used at the home marker (`turn_duration - trim`).
    pub fn home_turn_duration(&self) -> Duration {
        secs((self.turn_duration_secs - self.home_turn_trim_secs).max(0.0))
    }
    pub fn interlock_settle(&self) -> Duration {
        secs(self.interlock_settle_secs)
    }
    pub fn interlock_recovery_pause(&self) -> Duration {
        secs(self.interlock_recovery_pause_secs)
    }
    pub fn wake_retry_pause(&self) -> Duration {
        secs(self.wake_retry_pause_secs)
    }
    pub fn startup_settle(&self) -> Duration {
        secs(self.startup_settle_secs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perception and homing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// A cached vision result younger than this is reused as-is.
    pub cache_ttl_secs: f64,
    /// Query the vision collaborator on every Nth poll.
    pub frame_skip_interval: u32,
    pub camera_width: u32,
    /// Field of view used to turn a marker's pixel offset into a bearing.
    pub horizontal_fov_deg: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 0.1,
            frame_skip_interval: 3,
            camera_width: 640,
            horizontal_fov_deg: 90.0,
        }
    }
}

impl PerceptionConfig {
    pub fn cache_ttl(&self) -> Duration {
        secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingConfig {
    /// Stop once the home marker is closer than this.
    pub stop_distance_m: f64,
    /// Steering angle alternated while scanning for the marker.
    pub sweep_angle_deg: f64,
    /// Steering angle held during the 180° turn (negative = left).
    pub turn_angle_deg: f64,
    /// Steering angle held during the turn-around at the marker.
    pub reverse_turn_angle_deg: f64,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            stop_distance_m: 0.4,
            sweep_angle_deg: 20.0,
            turn_angle_deg: -45.0,
            reverse_turn_angle_deg: -22.5,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search recovery
// ────────────────────────────────────────────────────────────────────────────

/// A growing wait: `base`, then `+ step` per consecutive failure, capped.
/// `extra` is added on top of every wait.
///
/// Missing fields in a partial TOML table fall back to the person-search
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_secs: f64,
    pub step_secs: f64,
    pub cap_secs: f64,
    pub extra_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: 0.15,
            step_secs: 0.1,
            cap_secs: 2.0,
            extra_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// "Person lost" sweep in FollowingUser.
    pub person: BackoffConfig,
    /// "Marker lost" sweep in ReturningHome.
    pub marker: BackoffConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            person: BackoffConfig::default(),
            marker: BackoffConfig {
                base_secs: 0.15,
                step_secs: 1.0,
                cap_secs: 3.0,
                extra_secs: 0.7,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Behavior
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// After the wake word, wait in TrackingUser for a raised arm instead of
    /// following the nearest person straight away.
    pub require_arm_raise: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Hardware backend
// ────────────────────────────────────────────────────────────────────────────

/// Which peripheral implementation the binary wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process simulated peripherals.
    #[default]
    Sim,
    /// Linux sysfs PWM and GPIO.
    Sysfs,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sim => write!(f, "sim"),
            Backend::Sysfs => write!(f, "sysfs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: Backend,
    /// sysfs PWM chip directory, e.g. `/sys/class/pwm/pwmchip0`.
    pub pwm_chip: String,
    pub motor_channel: u32,
    pub steering_channel: u32,
    /// sysfs GPIO root, e.g. `/sys/class/gpio`.
    pub gpio_root: String,
    /// Proximity input line; `None` runs without the interlock.
    pub proximity_pin: Option<u32>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            pwm_chip: "/sys/class/pwm/pwmchip0".to_string(),
            motor_channel: 0,
            steering_channel: 1,
            gpio_root: "/sys/class/gpio".to_string(),
            proximity_pin: Some(23),
        }
    }
}
