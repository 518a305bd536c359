//! [`Rig`] – the vehicle's complete set of peripherals, owned by the control
//! loop.

use courier_types::{CourierConfig, CourierError};
use tracing::{info, warn};

use crate::motor::MotorActuator;
use crate::proximity::ProximitySensor;
use crate::steering::SteeringActuator;
use crate::sysfs::{SysfsGpioInput, SysfsPwm};

pub struct Rig {
    pub motor: MotorActuator,
    pub steering: SteeringActuator,
    /// `None` when the interlock line is absent; the loop then runs without
    /// the proximity interlock.
    pub proximity: Option<Box<dyn ProximitySensor>>,
}

impl Rig {
    /// Open the real peripherals through sysfs.
    ///
    /// Steering comes up first (centered), then the motor (stopped). If the
    /// motor fails, the already-opened steering line is released before the
    /// error is returned. A proximity line that cannot be opened is not
    /// fatal: the rig comes back without it and a warning is logged.
    pub fn open_sysfs(cfg: &CourierConfig) -> Result<Self, CourierError> {
        let hw = &cfg.hardware;

        let steering_pwm = SysfsPwm::open(
            "steering",
            &hw.pwm_chip,
            hw.steering_channel,
            cfg.steering.frequency_hz,
        )?;
        let mut steering = SteeringActuator::new(steering_pwm, cfg.steering)?;

        let motor = SysfsPwm::open("motor", &hw.pwm_chip, hw.motor_channel, cfg.motor.frequency_hz)
            .and_then(|pwm| MotorActuator::new(pwm, cfg.motor));
        let motor = match motor {
            Ok(m) => m,
            Err(e) => {
                if let Err(release_err) = steering.release() {
                    warn!(error = %release_err, "steering release failed during aborted startup");
                }
                return Err(e);
            }
        };

        let proximity = match hw.proximity_pin {
            Some(pin) => {
                match SysfsGpioInput::open("proximity", &hw.gpio_root, pin, cfg.proximity.active_high)
                {
                    Ok(sensor) => {
                        info!(pin, "proximity interlock armed");
                        Some(sensor as Box<dyn ProximitySensor>)
                    }
                    Err(e) => {
                        warn!(error = %e, "proximity sensor unavailable; interlock disabled");
                        None
                    }
                }
            }
            None => {
                warn!("no proximity pin configured; interlock disabled");
                None
            }
        };

        Ok(Self {
            motor,
            steering,
            proximity,
        })
    }
}
