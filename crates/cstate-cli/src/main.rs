//! cstate-disabler entry point.
//!
//! Requests a zero-latency PM QOS constraint so CPUs stay out of deep
//! C-states, holds it until the user presses enter (or a signal or
//! timeout ends the wait), then restores normal power management.

mod signals;
mod wait;

use anyhow::{Context, Result};
use clap::Parser;
use cstate_common::config::{GuardConfig, WaitMode};
use cstate_common::error::QosError;
use cstate_runtime::latency::LatencyGuard;
use cstate_runtime::probe::check_qos_capabilities;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::signals::SignalHandler;

/// System-wide configuration file.
const SYSTEM_CONFIG_PATH: &str = "/etc/cstate-disabler/config.toml";

/// cstate-disabler command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cstate-disabler",
    about = "Keep CPUs out of deep C-states by holding a zero-latency PM QOS request",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Latency-control device (overrides config file).
    #[arg(long, short = 'd', value_name = "PATH")]
    device: Option<PathBuf>,

    /// Requested maximum latency in microseconds (overrides config file).
    #[arg(
        long,
        short = 't',
        value_name = "MICROSECONDS",
        allow_negative_numbers = true
    )]
    target_us: Option<i32>,

    /// What to wait for before restoring: enter, signal or none.
    #[arg(long, short = 'w', value_name = "MODE")]
    wait: Option<WaitMode>,

    /// Restore automatically after this long (e.g. "30m", "2h 15m").
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    hold_for: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,

    /// Print device capabilities as JSON and exit without acquiring.
    #[arg(long)]
    probe: bool,
}

fn main() {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Initialize logging with the specified log level.
///
/// Logs go to stderr so stdout carries only the prompt.
fn init_logging(level: &str) {
    let filter = format!(
        "cstate_disabler={},cstate_runtime={},cstate_common={}",
        level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;

    if args.probe {
        let caps = check_qos_capabilities(&config.device);
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(());
    }

    debug!(?config, "Configuration resolved");

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;
    let mut guard = LatencyGuard::from_config(&config)?;

    guard.acquire()?;

    let reason = wait::hold(&config, &signal_handler);
    info!(
        %reason,
        signals = signal_handler.state().signal_count(),
        "Restoring normal power management"
    );

    guard.release();
    Ok(())
}

/// Exit status for a failed run: the errno of a device failure, else 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<QosError>())
        .map_or(1, QosError::exit_code)
}

/// Load configuration and apply command-line overrides.
fn resolve_config(args: &Args) -> Result<GuardConfig> {
    let mut config = load_config(args)?;

    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(target) = args.target_us {
        config.target_latency_us = target;
    }
    if let Some(wait) = args.wait {
        config.wait = wait;
    }
    if let Some(hold_for) = args.hold_for {
        config.hold_for = Some(hold_for);
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CSTATE_CONFIG_PATH` environment variable
/// 3. `/etc/cstate-disabler/config.toml` (system path)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<GuardConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return GuardConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    if let Ok(env_path) = std::env::var("CSTATE_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from CSTATE_CONFIG_PATH");
            return GuardConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from CSTATE_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "CSTATE_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return GuardConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {:?}", system_path));
    }

    debug!("No config file found, using built-in defaults");
    Ok(GuardConfig::default())
}
