//! Canopy collector daemon.
//!
//! Runs the root/monitor node: tracks which reporters are alive, expires
//! stale rows, and logs a periodic report.
//!
//! # Usage
//!
//! ```sh
//! canopy-collector --bind [::]:5678 --capacity 10 --interval 60 --timeout 3
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use canopy::net::Endpoint;
use canopy::runtime::{Collector, CollectorConfig, CollectorError};

/// Default bind address.
const DEFAULT_BIND: &str = "[::]:5678";

/// Global flag for signal handling.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn main() {
    if let Err(e) = run() {
        eprintln!("canopy-collector: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CollectorError> {
    canopy::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let config = parse_args(&args)?;

    eprintln!(
        "canopy-collector: starting on {} ({} slots)",
        config.bind_addr, config.capacity
    );

    let handle = Collector::spawn(config)?;

    eprintln!("canopy-collector: ready on {}", handle.local_addr());

    let shutdown_flag = handle.shutdown_flag();
    setup_signal_handlers();

    // Wait for shutdown signal
    while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    eprintln!("\ncanopy-collector: received shutdown signal");
    shutdown_flag.store(true, Ordering::Relaxed);

    eprintln!("canopy-collector: shutting down...");
    handle.shutdown();
    eprintln!("canopy-collector: stopped");

    Ok(())
}

/// Sets up signal handlers for graceful shutdown.
fn setup_signal_handlers() {
    // Spawn a thread that uses platform APIs to wait for signals
    std::thread::Builder::new()
        .name("signal-handler".into())
        .spawn(|| {
            wait_for_signal();
            SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
        })
        .expect("failed to spawn signal handler thread");
}

/// Waits for SIGTERM or SIGINT using platform-specific APIs.
///
/// Note: For proper signal handling, consider adding the `signal-hook`
/// crate. For now this just blocks - Ctrl+C terminates the process, and the
/// Drop impl on the handle signals shutdown to the collector thread.
fn wait_for_signal() {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn invalid_input(msg: impl Into<String>) -> CollectorError {
    CollectorError::Bind(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        msg.into(),
    ))
}

/// Parses command line arguments into a CollectorConfig.
fn parse_args(args: &[String]) -> Result<CollectorConfig, CollectorError> {
    let mut config = CollectorConfig::default();
    let mut bind_addr: Option<SocketAddr> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| invalid_input("missing value for --bind"))?;
                bind_addr = Some(
                    value
                        .parse()
                        .map_err(|e| invalid_input(format!("invalid --bind: {e}")))?,
                );
            }
            "--capacity" | "-c" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --capacity"))?;
                config.capacity = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --capacity: {e}")))?;
            }
            "--interval" | "-n" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --interval"))?;
                let secs: u64 = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --interval: {e}")))?;
                config.tick_interval = Duration::from_secs(secs);
            }
            "--timeout" | "-t" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --timeout"))?;
                config.timeout_ticks = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --timeout: {e}")))?;
            }
            "--recv-buffer" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --recv-buffer"))?;
                config.recv_buffer_size = Some(
                    value
                        .parse()
                        .map_err(|e| invalid_input(format!("invalid --recv-buffer: {e}")))?,
                );
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(invalid_input(format!("unknown argument: {arg}")));
            }
        }
        i += 1;
    }

    // Use defaults if not specified
    let bind_addr = bind_addr.unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind is valid"));
    config.bind_addr = Endpoint::from(bind_addr);

    Ok(config)
}

fn print_usage() {
    eprintln!(
        r#"canopy-collector - mesh telemetry root/monitor daemon

USAGE:
    canopy-collector [OPTIONS]

OPTIONS:
    -b, --bind <ADDR>       Bind address (default: [::]:5678)
    -c, --capacity <N>      Node table slots (default: 10)
    -n, --interval <SECS>   Tick interval: evictions + report (default: 60)
    -t, --timeout <TICKS>   Ticks without an update before eviction (default: 3)
        --recv-buffer <B>   Kernel receive buffer size in bytes
    -h, --help              Print this help message

SIGNALS:
    SIGTERM, SIGINT         Graceful shutdown

EXAMPLE:
    canopy-collector --bind [::]:5678 --capacity 50 --interval 60 --timeout 3
"#
    );
}
