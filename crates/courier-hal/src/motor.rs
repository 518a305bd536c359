//! [`MotorActuator`] – speed multiplier in, clamped drive duty out.
//!
//! The speed controller on the drive motor is inverted: `stop_duty` is
//! standstill and lower duty is faster. Anything below `reverse_threshold`
//! would flip the controller into reverse, so every command is clamped to
//! `[reverse_threshold, stop_duty]` before it reaches the PWM line. The
//! clamp is the safety mechanism; out-of-range inputs are never an error.
//!
//! | Call | Duty written |
//! |---|---|
//! | `forward(m)` | `clamp(max_forward_duty * m, reverse_threshold, stop_duty)` |
//! | `stop()` | `stop_duty` |

use courier_types::CourierError;
use courier_types::config::MotorConfig;
use tracing::trace;

use crate::pwm::PwmChannel;

/// Named speed presets, resolved against [`MotorConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Slow,
    Medium,
    Fast,
    /// Used while turning in place.
    Turn,
}

impl Speed {
    pub fn multiplier(self, cfg: &MotorConfig) -> f64 {
        match self {
            Speed::Slow => cfg.slow,
            Speed::Medium => cfg.medium,
            Speed::Fast => cfg.fast,
            Speed::Turn => cfg.turn,
        }
    }
}

/// Duty for a forward command. Non-finite products, and a calibration whose
/// band is empty or NaN, resolve to `stop_duty`.
pub fn forward_duty(cfg: &MotorConfig, speed_multiplier: f64) -> f64 {
    let duty = cfg.max_forward_duty * speed_multiplier;
    let band_ok = cfg.reverse_threshold.is_finite()
        && cfg.stop_duty.is_finite()
        && cfg.reverse_threshold <= cfg.stop_duty;
    if !duty.is_finite() || !band_ok {
        return cfg.stop_duty;
    }
    duty.clamp(cfg.reverse_threshold, cfg.stop_duty)
}

pub struct MotorActuator {
    pwm: Box<dyn PwmChannel>,
    cfg: MotorConfig,
    duty: f64,
}

impl MotorActuator {
    /// Wrap `pwm` and immediately command a stop.
    pub fn new(pwm: Box<dyn PwmChannel>, cfg: MotorConfig) -> Result<Self, CourierError> {
        let mut motor = Self {
            pwm,
            cfg,
            duty: cfg.stop_duty,
        };
        motor.stop()?;
        Ok(motor)
    }

    pub fn forward(&mut self, speed_multiplier: f64) -> Result<(), CourierError> {
        let duty = forward_duty(&self.cfg, speed_multiplier);
        trace!(speed = speed_multiplier, duty, "motor forward");
        self.write(duty)
    }

    /// [`forward`][Self::forward] at a configured preset.
    pub fn drive(&mut self, speed: Speed) -> Result<(), CourierError> {
        self.forward(speed.multiplier(&self.cfg))
    }

    pub fn stop(&mut self) -> Result<(), CourierError> {
        trace!(duty = self.cfg.stop_duty, "motor stop");
        self.write(self.cfg.stop_duty)
    }

    /// Last duty successfully written.
    pub fn duty(&self) -> f64 {
        self.duty
    }

    pub fn is_stopped(&self) -> bool {
        self.duty >= self.cfg.stop_duty
    }

    pub fn release(&mut self) -> Result<(), CourierError> {
        self.pwm.release()
    }

    fn write(&mut self, duty: f64) -> Result<(), CourierError> {
        self.pwm.set_duty(duty)?;
        self.duty = duty;
        Ok(())
    }
}
