//! # EXO robot control server
//!
//! Soft-real-time control server for multi-DoF robots: a periodic
//! control loop fuses per-actuator sensors and drives motor outputs
//! while this binary's dispatcher thread exposes the robot to remote
//! clients over TCP/UDP.
//!
//! ```bash
//! # Serve the configurations under ./config with default ports
//! exo_server
//!
//! # Explicit root, bind address and startup configuration
//! exo_server --root /opt/exo --addr 10.0.0.2 --config dual_motors
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exo_common::consts::DISPATCH_PERIOD_MS;
use exo_common::Environment;
use exo_hal::DeviceManager;
use exo_server::{NetworkOptions, System};

/// Robot control server with pluggable devices and controllers.
#[derive(Parser, Debug)]
#[command(name = "exo_server")]
#[command(version)]
#[command(about = "Multi-DoF robot control server")]
struct Args {
    /// Root directory containing config/ subtrees
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Directory for sample log files
    #[arg(short, long, default_value = "./logs/")]
    log: PathBuf,

    /// Bind address for all sockets
    #[arg(short, long)]
    addr: Option<String>,

    /// Initial robot configuration name
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    if let Err(startup_error) = run() {
        error!("startup failed: {startup_error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("EXO server v{} starting", env!("CARGO_PKG_VERSION"));

    let env = Environment::new(&args.root, &args.log);
    let manager = DeviceManager::default();

    let mut net = NetworkOptions::default();
    if let Some(addr) = &args.addr {
        net.host = addr.clone();
    }

    let mut system = System::new(env, manager, &net)?;
    if let Some(config_name) = &args.config {
        system.set_initial_config(config_name)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let stop = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        stop.store(false, Ordering::SeqCst);
    })?;

    let wake = Duration::from_millis(DISPATCH_PERIOD_MS);
    while running.load(Ordering::SeqCst) {
        system.update();
        std::thread::sleep(wake);
    }

    system.shutdown();
    info!("clean shutdown");
    Ok(())
}
