//! In-process simulated peripherals for headless runs and tests.
//!
//! Every simulated driver hands out a cloneable *probe* that shares its
//! state, so a test can keep the probe after moving the driver into an
//! actuator and still inspect (or script) what the hardware saw.
//!
//! # Example
//!
//! ```rust
//! use courier_hal::sim::SimRig;
//! use courier_types::CourierConfig;
//!
//! let (mut rig, probes) = SimRig::new().build(&CourierConfig::default()).unwrap();
//! rig.motor.forward(1.0).unwrap();
//! assert_eq!(probes.motor.last(), Some(76.0));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use courier_types::{CourierConfig, CourierError};

use crate::motor::MotorActuator;
use crate::proximity::ProximitySensor;
use crate::pwm::PwmChannel;
use crate::rig::Rig;
use crate::steering::SteeringActuator;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// PWM
// ────────────────────────────────────────────────────────────────────────────

/// Duties kept per simulated line; older ones are dropped.
pub const PWM_HISTORY_LEN: usize = 1024;

#[derive(Debug, Default)]
struct PwmState {
    duties: VecDeque<f64>,
    released: bool,
    failing: bool,
}

/// Shared view of a [`SimPwm`].
#[derive(Debug, Clone, Default)]
pub struct PwmProbe(Arc<Mutex<PwmState>>);

impl PwmProbe {
    /// Most recent duty written, if any.
    pub fn last(&self) -> Option<f64> {
        locked(&self.0).duties.back().copied()
    }

    /// The last [`PWM_HISTORY_LEN`] duties written since creation (or the
    /// last [`clear`][Self::clear]), oldest first.
    pub fn history(&self) -> Vec<f64> {
        locked(&self.0).duties.iter().copied().collect()
    }

    pub fn clear(&self) {
        locked(&self.0).duties.clear();
    }

    pub fn released(&self) -> bool {
        locked(&self.0).released
    }

    /// Make every subsequent command fail with a hardware fault.
    pub fn set_failing(&self, failing: bool) {
        locked(&self.0).failing = failing;
    }
}

/// A simulated PWM line that records every duty it receives.
pub struct SimPwm {
    id: String,
    state: PwmProbe,
}

impl SimPwm {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            state: PwmProbe::default(),
        })
    }

    pub fn probe(&self) -> PwmProbe {
        self.state.clone()
    }
}

impl PwmChannel for SimPwm {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_duty(&mut self, percent: f64) -> Result<(), CourierError> {
        let mut s = locked(&self.state.0);
        if s.failing {
            return Err(CourierError::hardware(&self.id, "simulated write failure"));
        }
        if s.duties.len() == PWM_HISTORY_LEN {
            s.duties.pop_front();
        }
        s.duties.push_back(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<(), CourierError> {
        let mut s = locked(&self.state.0);
        if s.failing {
            return Err(CourierError::hardware(&self.id, "simulated release failure"));
        }
        s.released = true;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Proximity
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProximityState {
    level: bool,
    failing: bool,
    reads: u64,
}

/// Shared handle that scripts a [`SimProximity`].
#[derive(Debug, Clone, Default)]
pub struct ProximityProbe(Arc<Mutex<ProximityState>>);

impl ProximityProbe {
    /// Set the level every following read returns.
    pub fn set(&self, too_close: bool) {
        locked(&self.0).level = too_close;
    }

    pub fn set_failing(&self, failing: bool) {
        locked(&self.0).failing = failing;
    }

    pub fn reads(&self) -> u64 {
        locked(&self.0).reads
    }
}

/// A simulated proximity line. Reads `false` until told otherwise.
pub struct SimProximity {
    id: String,
    state: ProximityProbe,
}

impl SimProximity {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            state: ProximityProbe::default(),
        })
    }

    pub fn probe(&self) -> ProximityProbe {
        self.state.clone()
    }
}

impl ProximitySensor for SimProximity {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_raw(&mut self) -> Result<bool, CourierError> {
        let mut s = locked(&self.state.0);
        s.reads += 1;
        if s.failing {
            return Err(CourierError::hardware(&self.id, "simulated read failure"));
        }
        Ok(s.level)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Probes for every peripheral of a rig built by [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimProbes {
    pub motor: PwmProbe,
    pub steering: PwmProbe,
    pub proximity: Option<ProximityProbe>,
}

/// Builder for a fully simulated [`Rig`].
pub struct SimRig {
    with_proximity: bool,
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRig {
    /// Motor, steering and a proximity sensor.
    pub fn new() -> Self {
        Self {
            with_proximity: true,
        }
    }

    /// Leave the proximity sensor out, as if the line were not wired.
    pub fn without_proximity(mut self) -> Self {
        self.with_proximity = false;
        self
    }

    pub fn build(self, cfg: &CourierConfig) -> Result<(Rig, SimProbes), CourierError> {
        let steering_pwm = SimPwm::new("steering");
        let motor_pwm = SimPwm::new("motor");
        let steering_probe = steering_pwm.probe();
        let motor_probe = motor_pwm.probe();

        let steering = SteeringActuator::new(steering_pwm, cfg.steering)?;
        let motor = MotorActuator::new(motor_pwm, cfg.motor)?;

        let (proximity, proximity_probe) = if self.with_proximity {
            let sensor = SimProximity::new("proximity");
            let probe = sensor.probe();
            (Some(sensor as Box<dyn ProximitySensor>), Some(probe))
        } else {
            (None, None)
        };

        Ok((
            Rig {
                motor,
                steering,
                proximity,
            },
            SimProbes {
                motor: motor_probe,
                steering: steering_probe,
                proximity: proximity_probe,
            },
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
