//! Canopy reporter daemon.
//!
//! Runs a leaf node: periodically reports the node's preferred parent and a
//! (simulated) sensor reading to the collector, buffering readings while
//! the collector is unreachable.
//!
//! # Usage
//!
//! ```sh
//! canopy-reporter --collector [fd00::1]:5678 --parent fe80::1 --interval 60
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use canopy::net::Endpoint;
use canopy::routing::StaticRoute;
use canopy::runtime::{Reporter, ReporterConfig, ReporterError};
use canopy::sensor::SimulatedTemperature;
use canopy::wire::NodeId;

/// Default bind address.
const DEFAULT_BIND: &str = "[::]:8765";

/// Global flag for signal handling.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn main() {
    if let Err(e) = run() {
        eprintln!("canopy-reporter: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ReporterError> {
    canopy::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let (config, route) = parse_args(&args)?;

    let handle = Reporter::spawn(config, route, SimulatedTemperature)?;

    eprintln!(
        "canopy-reporter: node {} ready on {}",
        handle.node(),
        handle.local_addr()
    );

    let shutdown_flag = handle.shutdown_flag();
    setup_signal_handlers();

    // Wait for shutdown signal
    while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    eprintln!("\ncanopy-reporter: received shutdown signal");
    shutdown_flag.store(true, Ordering::Relaxed);

    eprintln!("canopy-reporter: shutting down...");
    handle.shutdown();
    eprintln!("canopy-reporter: stopped");

    Ok(())
}

/// Sets up signal handlers for graceful shutdown.
fn setup_signal_handlers() {
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
/// Drop impl on the handle signals shutdown to the reporter thread.
fn wait_for_signal() {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn invalid_input(msg: impl Into<String>) -> ReporterError {
    ReporterError::Bind(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        msg.into(),
    ))
}

/// Parses command line arguments into a ReporterConfig and route.
fn parse_args(args: &[String]) -> Result<(ReporterConfig, StaticRoute), ReporterError> {
    let mut config = ReporterConfig::default();
    let mut bind_addr: Option<SocketAddr> = None;
    let mut collector: Option<SocketAddr> = None;
    let mut parent: Option<Ipv6Addr> = None;

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
            "--collector" | "-c" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --collector"))?;
                collector = Some(
                    value
                        .parse()
                        .map_err(|e| invalid_input(format!("invalid --collector: {e}")))?,
                );
            }
            "--parent" | "-p" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --parent"))?;
                parent = Some(
                    value
                        .parse()
                        .map_err(|e| invalid_input(format!("invalid --parent: {e}")))?,
                );
            }
            "--node" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --node"))?;
                let raw = u32::from_str_radix(value.trim_start_matches("0x"), 16)
                    .map_err(|e| invalid_input(format!("invalid --node (hex): {e}")))?;
                config.node = Some(NodeId::from(raw));
            }
            "--interval" | "-n" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --interval"))?;
                let secs: u64 = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --interval: {e}")))?;
                config.send_interval = Duration::from_secs(secs);
            }
            "--reconnect" | "-r" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --reconnect"))?;
                let secs: u64 = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --reconnect: {e}")))?;
                config.reconnect_interval = Duration::from_secs(secs);
            }
            "--buffer" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| invalid_input("missing value for --buffer"))?;
                config.buffer_capacity = value
                    .parse()
                    .map_err(|e| invalid_input(format!("invalid --buffer: {e}")))?;
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

    let collector = collector.ok_or_else(|| invalid_input("missing --collector <ADDR>"))?;
    let route = match parent {
        Some(parent) => StaticRoute::with_parent(Endpoint::from(collector), parent),
        None => StaticRoute::new(Endpoint::from(collector)),
    };

    let bind_addr = bind_addr.unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind is valid"));
    config.bind_addr = Endpoint::from(bind_addr);

    Ok((config, route))
}

fn print_usage() {
    eprintln!(
        r#"canopy-reporter - mesh telemetry leaf daemon

USAGE:
    canopy-reporter --collector <ADDR> [OPTIONS]

OPTIONS:
    -c, --collector <ADDR>  Collector (root) address, e.g. [fd00::1]:5678
    -b, --bind <ADDR>       Bind address (default: [::]:8765)
    -p, --parent <IPV6>     Preferred parent address to report
        --node <HEX>        Node identity (default: random)
    -n, --interval <SECS>   Interval between reports (default: 60)
    -r, --reconnect <SECS>  Interval between reconnect attempts (default: 10)
        --buffer <N>        Reading buffer capacity (default: 10)
    -h, --help              Print this help message

SIGNALS:
    SIGTERM, SIGINT         Graceful shutdown

EXAMPLE:
    canopy-reporter --collector [fd00::1]:5678 --parent fe80::1 --interval 60
"#
    );
}
