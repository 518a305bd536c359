//! Generic `ProximitySensor` trait for the single "object too close" input
//! line that feeds the safety interlock.

use courier_types::CourierError;

/// A binary near-field sensor.
///
/// `read_raw` reports the *undebounced* level, already normalised so that
/// `true` always means "something is too close" regardless of the wiring's
/// active level. Debouncing lives in the kernel's `ProximityGuard`.
pub trait ProximitySensor: Send {
    /// Stable identifier for this sensor, e.g. `"front_ir"`.
    fn id(&self) -> &str;

    /// Sample the line once.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::HardwareFault`] if the line cannot be read.
    fn read_raw(&mut self) -> Result<bool, CourierError>;
}
