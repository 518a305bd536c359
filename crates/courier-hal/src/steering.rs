//! [`SteeringActuator`] – bounded angle in, servo duty out.
//!
//! Negative angles steer left, positive steer right. The duty is linearly
//! interpolated between `center_duty` and the matching end stop as a fraction
//! of [`MAX_ANGLE_DEG`], then clamped to the span of the three calibration
//! values.

use courier_types::CourierError;
use courier_types::config::SteeringConfig;
use tracing::trace;

use crate::pwm::PwmChannel;

/// Mechanical end stop on either side.
pub const MAX_ANGLE_DEG: f64 = 45.0;

/// Clamp an angle into `[-MAX_ANGLE_DEG, MAX_ANGLE_DEG]`. NaN becomes 0.
pub fn clamp_angle(angle_deg: f64) -> f64 {
    if angle_deg.is_nan() {
        return 0.0;
    }
    angle_deg.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG)
}

/// Duty for a steering command.
pub fn steering_duty(cfg: &SteeringConfig, angle_deg: f64) -> f64 {
    let angle = clamp_angle(angle_deg);
    let end = if angle < 0.0 {
        cfg.left_max_duty
    } else {
        cfg.right_max_duty
    };
    let duty = cfg.center_duty + (end - cfg.center_duty) * (angle.abs() / MAX_ANGLE_DEG);
    let lo = cfg.center_duty.min(cfg.left_max_duty).min(cfg.right_max_duty);
    let hi = cfg.center_duty.max(cfg.left_max_duty).max(cfg.right_max_duty);
    duty.clamp(lo, hi)
}

pub struct SteeringActuator {
    pwm: Box<dyn PwmChannel>,
    cfg: SteeringConfig,
    angle: f64,
}

impl SteeringActuator {
    /// Wrap `pwm` and immediately center the wheels.
    pub fn new(pwm: Box<dyn PwmChannel>, cfg: SteeringConfig) -> Result<Self, CourierError> {
        let mut steering = Self {
            pwm,
            cfg,
            angle: 0.0,
        };
        steering.center()?;
        Ok(steering)
    }

    pub fn set_angle(&mut self, angle_deg: f64) -> Result<(), CourierError> {
        let angle = clamp_angle(angle_deg);
        let duty = steering_duty(&self.cfg, angle);
        trace!(angle, duty, "steering set");
        self.pwm.set_duty(duty)?;
        self.angle = angle;
        Ok(())
    }

    pub fn center(&mut self) -> Result<(), CourierError> {
        trace!(duty = self.cfg.center_duty, "steering center");
        self.pwm.set_duty(self.cfg.center_duty)?;
        self.angle = 0.0;
        Ok(())
    }

    /// Last angle successfully commanded, after clamping.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn is_centered(&self) -> bool {
        self.angle == 0.0
    }

    pub fn release(&mut self) -> Result<(), CourierError> {
        self.pwm.release()
    }
}
