//! Configuration vault – reads/writes `~/.courier/config.toml`.
//!
//! The file holds a (possibly partial) [`CourierConfig`]; anything it leaves
//! out keeps its default. On first run the defaults are written out so there
//! is something to edit.

use std::fs;
use std::path::{Path, PathBuf};

use courier_types::config::Backend;
use courier_types::{CourierConfig, CourierError};
use tracing::{info, warn};

/// Path of the config file: `$COURIER_CONFIG`, else `~/.courier/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("COURIER_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".courier").join("config.toml")
}

/// Load the config at `path`. Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<CourierConfig>, CourierError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        CourierError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        CourierError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Load `path` (writing defaults there on first run), apply `COURIER_*`
/// environment overrides and validate. The flag is `true` on first run.
pub fn load_or_init(path: &Path) -> Result<(CourierConfig, bool), CourierError> {
    let (mut cfg, first_run) = match load_from(path)? {
        Some(cfg) => (cfg, false),
        None => {
            let cfg = CourierConfig::default();
            match save_to(&cfg, path) {
                Ok(()) => info!(path = %path.display(), "wrote default configuration"),
                Err(e) => warn!(error = %e, "could not write default configuration"),
            }
            (cfg, true)
        }
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok((cfg, first_run))
}

/// Apply `COURIER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `COURIER_BACKEND` | `hardware.backend` (`sim` or `sysfs`) |
/// | `COURIER_TICK_MS` | `timing.tick_interval_secs` |
/// | `COURIER_PROXIMITY_PIN` | `hardware.proximity_pin` (`none` disables) |
pub fn apply_env_overrides(cfg: &mut CourierConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut CourierConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("COURIER_BACKEND") {
        match v.trim().to_ascii_lowercase().as_str() {
            "sim" => cfg.hardware.backend = Backend::Sim,
            "sysfs" => cfg.hardware.backend = Backend::Sysfs,
            other => warn!(value = other, "ignoring unknown COURIER_BACKEND"),
        }
    }
    if let Some(v) = lookup("COURIER_TICK_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => cfg.timing.tick_interval_secs = ms as f64 / 1000.0,
            Err(_) => warn!(value = %v, "ignoring invalid COURIER_TICK_MS"),
        }
    }
    if let Some(v) = lookup("COURIER_PROXIMITY_PIN") {
        let v = v.trim();
        if v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("off") {
            cfg.hardware.proximity_pin = None;
        } else {
            match v.parse::<u32>() {
                Ok(pin) => cfg.hardware.proximity_pin = Some(pin),
                Err(_) => warn!(value = v, "ignoring invalid COURIER_PROXIMITY_PIN"),
            }
        }
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &CourierConfig, path: &Path) -> Result<(), CourierError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CourierError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                CourierError::Config(format!("failed to restrict {}: {e}", parent.display()))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| CourierError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                CourierError::Config(format!("failed to write {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| CourierError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn temp_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        (dir, path)
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, path) = temp_path();
        save_to(&CourierConfig::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn saved_defaults_load_back_unchanged() {
        let (_dir, path) = temp_path();
        save_to(&CourierConfig::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, CourierConfig::default());
    }

    #[test]
    fn config_path_points_to_courier_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.courier/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let (_dir, path) = temp_path();
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn first_run_writes_defaults() {
        let (_dir, path) = temp_path();
        let (cfg, first_run) = load_or_init(&path).expect("init");
        assert!(first_run);
        assert!(path.exists());
        assert_eq!(cfg.perception.frame_skip_interval, 3);

        let (_, first_run) = load_or_init(&path).expect("reload");
        assert!(!first_run);
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let (_dir, path) = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[motor\nstop_duty = ").unwrap();
        assert!(matches!(load_from(&path), Err(CourierError::Config(_))));
    }

    #[test]
    fn inconsistent_file_fails_validation() {
        let (_dir, path) = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[perception]\nframe_skip_interval = 0\n").unwrap();
        assert!(load_or_init(&path).is_err());
    }

    #[test]
    fn overrides_set_backend_tick_and_pin() {
        let mut cfg = CourierConfig::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("COURIER_BACKEND", "SysFS"),
                ("COURIER_TICK_MS", "20"),
                ("COURIER_PROXIMITY_PIN", "17"),
            ]),
        );
        assert_eq!(cfg.hardware.backend, Backend::Sysfs);
        assert_eq!(cfg.timing.tick_interval_secs, 0.02);
        assert_eq!(cfg.hardware.proximity_pin, Some(17));
    }

    #[test]
    fn proximity_pin_none_disables_the_sensor() {
        let mut cfg = CourierConfig::default();
        apply_overrides(&mut cfg, env(&[("COURIER_PROXIMITY_PIN", "none")]));
        assert_eq!(cfg.hardware.proximity_pin, None);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = CourierConfig::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("COURIER_BACKEND", "gpio"),
                ("COURIER_TICK_MS", "fast"),
                ("COURIER_PROXIMITY_PIN", "-3"),
            ]),
        );
        assert_eq!(cfg, CourierConfig::default());
    }
}
