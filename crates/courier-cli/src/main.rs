//! `courier` – ignition switch for the Courier vehicle.
//!
//! 1. Loads `~/.courier/config.toml`, writing defaults on first run.
//! 2. Opens the actuator rig for the configured backend (`sim` or `sysfs`).
//! 3. Runs the control loop until **Ctrl-C** / SIGTERM, then parks the
//!    vehicle and releases the hardware.
//!
//! The binary bundles only a keyboard wake word (press Enter) and an idle
//! vision stand-in; real perception collaborators are wired in through
//! [`courier_runtime::Collaborators`].

mod config;
mod line_wake;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use courier_hal::Rig;
use courier_hal::sim::SimRig;
use courier_perception::sim::ScriptedVision;
use courier_runtime::telemetry::init_tracing;
use courier_runtime::{Collaborators, ControlLoop};
use courier_types::CourierConfig;
use courier_types::config::Backend;
use tracing::{error, info, warn};

use crate::line_wake::LineWakeWord;

fn main() -> ExitCode {
    let _telemetry = init_tracing("courier");

    print_banner();

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Stop requested – parking the vehicle …".yellow().bold());
        running_ctrlc.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the vehicle can only be stopped by killing the process");
    }

    let path = config::config_path();
    let cfg = match config::load_or_init(&path) {
        Ok((cfg, first_run)) => {
            if first_run {
                println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
            } else {
                println!("  Config loaded from {}", path.display().to_string().bold());
            }
            cfg
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "configuration rejected");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(drive(cfg, running))
}

async fn drive(cfg: CourierConfig, running: Arc<AtomicBool>) -> ExitCode {
    let backend = cfg.hardware.backend;
    info!(%backend, "opening actuator rig");

    let rig = match backend {
        Backend::Sim => SimRig::new().build(&cfg).map(|(rig, _probes)| rig),
        Backend::Sysfs => Rig::open_sysfs(&cfg),
    };
    let rig = match rig {
        Ok(rig) => rig,
        Err(e) => {
            error!(error = %e, "hardware initialisation failed");
            return ExitCode::FAILURE;
        }
    };

    // ESCs need a stop pulse before they accept throttle.
    if backend == Backend::Sysfs {
        tokio::time::sleep(cfg.timing.startup_settle()).await;
    }

    let collab = Collaborators {
        vision: Box::new(ScriptedVision::new()),
        wake_word: Box::new(LineWakeWord::stdin()),
        homing: None,
    };

    println!(
        "\n  {} Press {} to summon the vehicle, {} to stop.\n",
        "Ready.".green().bold(),
        "Enter".bold().cyan(),
        "Ctrl-C".bold().cyan()
    );

    let mut ctl = ControlLoop::new(cfg, rig, collab);
    ctl.run(running).await;
    ctl.shutdown();

    println!("{}", "  ✓ Vehicle parked, hardware released.".green());
    ExitCode::SUCCESS
}

fn print_banner() {
    println!();
    println!("{}", r#"   ______                 _           "#.bold().cyan());
    println!("{}", r#"  / ____/___  __  _______(_)__  _____ "#.bold().cyan());
    println!("{}", r#" / /   / __ \/ / / / ___/ / _ \/ ___/ "#.bold().cyan());
    println!("{}", r#"/ /___/ /_/ / /_/ / /  / /  __/ /     "#.bold().cyan());
    println!("{}", r#"\____/\____/\__,_/_/  /_/\___/_/      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Courier".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Follow-me delivery vehicle controller");
    println!();
}
