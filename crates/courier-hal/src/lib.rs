//! `courier-hal` – hardware abstraction for the drive motor, the steering
//! servo and the proximity line.
//!
//! One trait per kind of peripheral ([`pwm::PwmChannel`],
//! [`proximity::ProximitySensor`]) with two implementations each: the
//! in-process [`sim`] backend and the Linux [`sysfs`] backend. The safe
//! command mapping lives in [`motor::MotorActuator`] and
//! [`steering::SteeringActuator`], which own their channel and clamp every
//! command before it reaches the line. A [`rig::Rig`] bundles the lot for the
//! control loop.

pub mod motor;
pub mod proximity;
pub mod pwm;
pub mod rig;
pub mod sim;
pub mod steering;
pub mod sysfs;

pub use motor::{MotorActuator, Speed};
pub use proximity::ProximitySensor;
pub use pwm::PwmChannel;
pub use rig::Rig;
pub use steering::SteeringActuator;
