//! Generic `PwmChannel` trait for duty-cycle driven peripherals (the drive
//! motor's speed controller and the steering servo).
//!
//! Drivers implement this trait and are handed to a
//! [`MotorActuator`][crate::motor::MotorActuator] or
//! [`SteeringActuator`][crate::steering::SteeringActuator] at construction.
//! The actuators own all the clamping; a channel writes whatever it is given.

use courier_types::CourierError;

/// One PWM output line.
pub trait PwmChannel: Send {
    /// Stable identifier for this channel, e.g. `"motor"` or `"steering"`.
    fn id(&self) -> &str;

    /// Drive the line at `percent` duty (0–100).
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::HardwareFault`] if the command cannot be
    /// applied.
    fn set_duty(&mut self, percent: f64) -> Result<(), CourierError>;

    /// Disable the output and hand the line back to the system.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::HardwareFault`] if the line cannot be released.
    fn release(&mut self) -> Result<(), CourierError>;
}
