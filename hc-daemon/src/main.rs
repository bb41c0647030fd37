//! hcontrold — the hydronic plant control daemon.
//!
//! Bootstraps the runtime (mode holder + alarm sink), the hardware
//! registry, and the embedded default plant layout (spec §1: a real
//! deployment replaces this with a parsed config file and real driver
//! crates), then runs the tick loop of spec §5 until a shutdown signal
//! arrives, at which point every entity is taken offline in reverse
//! dependency order before the process exits.

mod backends;
mod control_loop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use hc_core::data::types::SystemMode;
use hc_core::runtime::LoggingAlarmSink;
use hc_core::{Plant, Runtime, Timekeep};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("hcontrold {VERSION} - hydronic plant control daemon");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    hcontrold [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -f, --foreground    Run in foreground (default; no daemonization)");
    eprintln!("    -d, --storage DIR   Directory for the storage boundary (default: /var/lib/hcontrold)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    HCONTROLD_LOG       Log level (trace, debug, info, warn, error)");
}

fn print_version() {
    println!("hcontrold {VERSION}");
}

fn init_logging() {
    let log_level = std::env::var("HCONTROLD_LOG").unwrap_or_else(|_| "info".to_string());
    let use_journald = std::path::Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("failed to create journald layer: {e}, falling back to stdout");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        eprintln!("PANIC at {location}: {message}");
    }));

    let mut storage_dir = "/var/lib/hcontrold".to_string();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            "-f" | "--foreground" => {}
            "-d" | "--storage" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --storage requires a path argument");
                    std::process::exit(2);
                }
                storage_dir = args[i].clone();
            }
            arg => {
                eprintln!("unknown argument: {arg}");
                print_help();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    init_logging();
    info!("hcontrold {VERSION} starting");

    let runtime = Arc::new(Runtime::new(SystemMode::Auto));
    let timekeep = Arc::new(Timekeep::new());

    let mut plant = Plant::new(
        Arc::clone(&runtime),
        Box::new(hc_core::NullScheduler),
        Box::new(LoggingAlarmSink),
        hc_core::plant_data::PlantDefaults {
            target_comfort: hc_core::Temperature::from_celsius(21.0),
            target_eco: hc_core::Temperature::from_celsius(18.0),
            target_frostfree: hc_core::Temperature::from_celsius(7.0),
            limit_wtmin: hc_core::Temperature::from_celsius(20.0),
            limit_wtmax: hc_core::Temperature::from_celsius(80.0),
            sleeping_delay: hc_core::Tick(10 * 60 * 1000),
        },
    );

    let config = match backends::default_plant_config(plant.registry_mut()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to build embedded plant layout: {e}");
            std::process::exit(1);
        }
    };

    let mut plant = match plant.configure(config) {
        Ok(p) => p,
        Err(e) => {
            error!("plant configuration rejected: {e}");
            std::process::exit(1);
        }
    };

    match backends::FileStorage::new(&storage_dir) {
        Ok(store) => plant.set_storage(Box::new(store)),
        Err(e) => warn!("storage directory {storage_dir} unavailable ({e}); latched state will not survive a restart"),
    }

    if let Err(e) = plant.online() {
        error!("plant failed to come online: {e}");
        std::process::exit(1);
    }
    info!("plant online");

    let plant = Arc::new(Mutex::new(plant));
    let shutdown = Arc::new(AtomicBool::new(false));

    let shutdown_for_handler = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown_for_handler.store(true, Ordering::SeqCst);
    }) {
        warn!("failed to install signal handler: {e}; shutdown via signal will not work cleanly");
    }

    control_loop::run(Arc::clone(&plant), timekeep, Arc::clone(&shutdown)).await;

    info!("taking plant offline");
    plant.lock().await.offline();

    info!("hcontrold shut down cleanly");
    Ok(())
}
