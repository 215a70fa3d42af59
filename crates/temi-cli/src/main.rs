//! `temi` – scripted session against a simulated temi.
//!
//! 1. Loads `temi.toml` (or `$TEMI_CONFIG`); falls back to defaults for the
//!    demo serial when the file is absent.
//! 2. Initialises tracing (`RUST_LOG`, `TEMI_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 3. Starts an in-process bus with a simulated robot, connects the adapter,
//!    and runs: battery query, navigate to a waypoint, wait for arrival,
//!    return home.
//! 4. Ctrl-C sends `stop` to the robot and exits.
//!
//! Usage: `temi [waypoint]` (default `kitchen`).

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use temi_adapter::config::{self, AdapterConfig};
use temi_adapter::{Command, Robot, telemetry};
use temi_middleware::EventBus;
use temi_sim::SimTemi;
use temi_types::{HOME_BASE, NavStatus, TemiError};
use tracing::warn;

const DEMO_SERIAL: &str = "00119260058";
const NAV_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => default_config(),
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            eprintln!("  Using default configuration.");
            default_config()
        }
    };

    // Tracing first: the OTLP exporter is synchronous and needs no runtime.
    let _guard = telemetry::init_tracing("temi-cli", &cfg.log);

    let target = std::env::args().nth(1).unwrap_or_else(|| "kitchen".to_string());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start runtime".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, target)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "Session failed".red());
            ExitCode::FAILURE
        }
    }
}

fn default_config() -> AdapterConfig {
    let mut cfg = AdapterConfig::for_serial(DEMO_SERIAL);
    config::apply_env_overrides(&mut cfg);
    cfg
}

async fn run(cfg: AdapterConfig, target: String) -> Result<(), TemiError> {
    print_banner(&cfg.serial);

    let bus = EventBus::default();
    let _sim = SimTemi::new(cfg.serial.clone())
        .with_waypoints([HOME_BASE, "kitchen", "sofa", "entrance"])
        .with_nav_step(Duration::from_millis(750))
        .spawn(&bus);

    let robot = Robot::connect(Arc::new(bus), &cfg).await?;
    println!("  {} connected to {}", "✓".green().bold(), robot.serial().bold());

    tokio::select! {
        result = session(&robot, &target) => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping robot …".yellow().bold());
            let outcome = robot.stop().await;
            println!("  stop: {outcome:?}");
            Ok(())
        }
    }
}

async fn session(robot: &Robot, target: &str) -> Result<(), TemiError> {
    let outcome = robot.get_battery_data().await;
    match robot.battery() {
        Some(b) => println!(
            "  battery: {:.0}% {} ({outcome:?})",
            b.percentage * 100.0,
            if b.is_charging { "charging" } else { "discharging" }
        ),
        None => println!("  battery: {} ({outcome:?})", "unknown".dimmed()),
    }
    println!("  waypoints: {}", robot.locations().join(", "));

    navigate(robot, target).await;
    navigate(robot, HOME_BASE).await;
    println!(
        "  docked: {}",
        if robot.docking_completed() { "yes".green() } else { "no".yellow() }
    );

    println!("\n  Final state:");
    println!("{}", serde_json::to_string_pretty(&robot.state())?);
    Ok(())
}

async fn navigate(robot: &Robot, location: &str) {
    println!("\n  → {}", location.bold());
    let outcome = robot.go_to_location(location).await;
    if let Err(e) = outcome.into_result(Command::GoToLocation.path()) {
        warn!(location, error = %e, "navigation request not acknowledged");
    }
    match robot.wait_for_nav_settled(NAV_TIMEOUT).await {
        Some(NavStatus::Complete) => {
            println!("  {} arrived at {}", "✓".green().bold(), robot.current_location());
        }
        Some(status) => println!("  {} navigation ended as {}", "✗".red().bold(), status.as_str().yellow()),
        None => println!("  {} still {} after {NAV_TIMEOUT:?}", "✗".red().bold(), robot.nav_status()),
    }
}

fn print_banner(serial: &str) {
    println!();
    println!("  {} {}", "temi adapter".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  simulated robot {}", serial.dimmed());
    println!();
}
