//! Linux sysfs drivers for the real vehicle.
//!
//! - [`SysfsPwm`] drives one channel of a `/sys/class/pwm/pwmchipN` chip.
//! - [`SysfsGpioInput`] reads one line under `/sys/class/gpio`.
//!
//! Both take their sysfs root as a parameter; nothing here hard-codes
//! `/sys`, so the drivers run unchanged against a scratch directory.

use std::fs;
use std::path::{Path, PathBuf};

use courier_types::CourierError;
use tracing::debug;

use crate::proximity::ProximitySensor;
use crate::pwm::PwmChannel;

fn write_attr(id: &str, path: &Path, value: impl ToString) -> Result<(), CourierError> {
    fs::write(path, value.to_string())
        .map_err(|e| CourierError::hardware(id, format!("write {}: {e}", path.display())))
}

/// Export `index` through `<root>/export` unless `<root>/<prefix><index>`
/// already exists, and return that directory.
fn export(id: &str, root: &Path, prefix: &str, index: u32) -> Result<PathBuf, CourierError> {
    if !root.is_dir() {
        return Err(CourierError::hardware(
            id,
            format!("{} does not exist", root.display()),
        ));
    }
    let dir = root.join(format!("{prefix}{index}"));
    if !dir.is_dir() {
        write_attr(id, &root.join("export"), index)?;
        if !dir.is_dir() {
            return Err(CourierError::hardware(
                id,
                format!("exporting {index} did not create {}", dir.display()),
            ));
        }
    }
    Ok(dir)
}

// ────────────────────────────────────────────────────────────────────────────
// PWM
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SysfsPwm {
    id: String,
    chip: PathBuf,
    channel: u32,
    dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export `channel` on `chip`, program the period for `frequency_hz` and
    /// enable the output at 0 % duty.
    pub fn open(
        id: impl Into<String>,
        chip: impl AsRef<Path>,
        channel: u32,
        frequency_hz: f64,
    ) -> Result<Box<Self>, CourierError> {
        let id = id.into();
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(CourierError::hardware(
                &id,
                format!("invalid PWM frequency {frequency_hz}"),
            ));
        }
        let chip = chip.as_ref().to_path_buf();
        let dir = export(&id, &chip, "pwm", channel)?;
        let period_ns = (1e9 / frequency_hz).round() as u64;

        write_attr(&id, &dir.join("period"), period_ns)?;
        write_attr(&id, &dir.join("duty_cycle"), 0)?;
        write_attr(&id, &dir.join("enable"), 1)?;
        debug!(id = %id, channel, period_ns, "sysfs PWM channel enabled");

        Ok(Box::new(Self {
            id,
            chip,
            channel,
            dir,
            period_ns,
        }))
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl PwmChannel for SysfsPwm {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_duty(&mut self, percent: f64) -> Result<(), CourierError> {
        let fraction = if percent.is_finite() {
            percent.clamp(0.0, 100.0) / 100.0
        } else {
            0.0
        };
        let duty_ns = (self.period_ns as f64 * fraction).round() as u64;
        write_attr(&self.id, &self.dir.join("duty_cycle"), duty_ns)
    }

    fn release(&mut self) -> Result<(), CourierError> {
        write_attr(&self.id, &self.dir.join("enable"), 0)?;
        write_attr(&self.id, &self.chip.join("unexport"), self.channel)?;
        debug!(id = %self.id, channel = self.channel, "sysfs PWM channel released");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GPIO input
// ────────────────────────────────────────────────────────────────────────────

pub struct SysfsGpioInput {
    id: String,
    value: PathBuf,
    active_high: bool,
}

impl SysfsGpioInput {
    /// Export `pin` under `root` and configure it as an input.
    pub fn open(
        id: impl Into<String>,
        root: impl AsRef<Path>,
        pin: u32,
        active_high: bool,
    ) -> Result<Box<Self>, CourierError> {
        let id = id.into();
        let dir = export(&id, root.as_ref(), "gpio", pin)?;
        write_attr(&id, &dir.join("direction"), "in")?;
        debug!(id = %id, pin, active_high, "sysfs GPIO input ready");
        Ok(Box::new(Self {
            id,
            value: dir.join("value"),
            active_high,
        }))
    }
}

impl ProximitySensor for SysfsGpioInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_raw(&mut self) -> Result<bool, CourierError> {
        let raw = fs::read_to_string(&self.value).map_err(|e| {
            CourierError::hardware(&self.id, format!("read {}: {e}", self.value.display()))
        })?;
        let high = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(CourierError::hardware(
                    &self.id,
                    format!("unexpected GPIO level {other:?}"),
                ));
            }
        };
        Ok(high == self.active_high)
    }
}
