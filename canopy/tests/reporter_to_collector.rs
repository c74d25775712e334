//! End-to-end integration tests for reporter-to-collector communication.
//!
//! These tests drive real localhost UDP sockets against spawned daemons:
//! 1. A raw socket plays reporter against a spawned collector (acks,
//!    validation, table bounds, eviction).
//! 2. A raw socket plays collector against a spawned reporter (reports,
//!    buffering, flush on ack).
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=canopy=debug cargo test -- --nocapture
//! ```

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use canopy::net::Endpoint;
use canopy::routing::{RouteSource, StaticRoute};
use canopy::runtime::{Collector, CollectorConfig, Reporter, ReporterConfig};
use canopy::sensor::{FixedReading, ReadingSource};
use canopy::wire::{
    decode_frame, encode_frame, AckFrame, Frame, NodeId, ReportFrame, MAX_FRAME_SIZE,
};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        canopy::init_tracing();
    });
}

/// Helper to create a UDP socket bound to localhost on an ephemeral port.
fn bind_ephemeral() -> (UdpSocket, Endpoint) {
    let socket = UdpSocket::bind("[::1]:0").expect("bind ephemeral");
    socket.set_nonblocking(true).expect("set nonblocking");
    let addr = socket.local_addr().expect("local addr");
    (socket, Endpoint::from(addr))
}

/// Helper to send a frame via UDP.
fn send_frame(socket: &UdpSocket, to: Endpoint, frame: &Frame) {
    let mut buf = Vec::new();
    encode_frame(frame, &mut buf);
    socket.send_to(&buf, to.as_socket_addr()).expect("send");
}

/// Helper to receive a frame via UDP with timeout.
fn recv_frame_timeout(socket: &UdpSocket, timeout: Duration) -> Option<(Frame, Endpoint)> {
    let deadline = std::time::Instant::now() + timeout;
    let mut buf = [0u8; MAX_FRAME_SIZE];

    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if let Ok(frame) = decode_frame(&buf[..len]) {
                    return Some((frame, Endpoint::from(from)));
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if std::time::Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(Duration::from_millis(1));
            }
            Err(_) => return None,
        }
    }
}

fn expect_ack(socket: &UdpSocket) -> AckFrame {
    match recv_frame_timeout(socket, Duration::from_secs(1)) {
        Some((Frame::Ack(ack), _)) => ack,
        other => panic!("expected Ack, got {other:?}"),
    }
}

fn spawn_collector(capacity: usize, tick_interval: Duration, timeout_ticks: u64) -> canopy::runtime::CollectorHandle {
    Collector::spawn(CollectorConfig {
        bind_addr: Endpoint::localhost(0),
        capacity,
        tick_interval,
        timeout_ticks,
        recv_buffer_size: None,
    })
    .expect("spawn collector")
}

#[test]
fn report_upserts_and_acks() {
    init_test_tracing();
    let handle = spawn_collector(10, Duration::from_secs(60), 3);
    let (socket, _) = bind_ephemeral();
    let node = NodeId::from(0xA1);

    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node,
            parent: Some("fe80::1".parse().unwrap()),
            reading: 25,
        }),
    );
    let ack = expect_ack(&socket);
    assert_eq!(ack.node, node);
    assert_eq!(ack.updates, 1);

    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node,
            parent: None,
            reading: 20,
        }),
    );
    let ack = expect_ack(&socket);
    assert_eq!(ack.updates, 2);

    handle.shutdown();
}

#[test]
fn malformed_datagrams_get_no_ack() {
    init_test_tracing();
    let handle = spawn_collector(10, Duration::from_secs(60), 3);
    let (socket, _) = bind_ephemeral();

    // Garbage bytes.
    socket
        .send_to(&[0xDE, 0xAD, 0xBE, 0xEF], handle.local_addr().as_socket_addr())
        .expect("send");

    // A truncated report (length field no longer matches).
    let mut buf = Vec::new();
    encode_frame(
        &Frame::Report(ReportFrame {
            node: NodeId::from(0xB2),
            parent: None,
            reading: 30,
        }),
        &mut buf,
    );
    buf.truncate(buf.len() - 5);
    socket
        .send_to(&buf, handle.local_addr().as_socket_addr())
        .expect("send");

    // Neither elicits an ack; a subsequent valid report is the first
    // update the collector applies.
    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node: NodeId::from(0xB2),
            parent: None,
            reading: 30,
        }),
    );
    let ack = expect_ack(&socket);
    assert_eq!(ack.node, NodeId::from(0xB2));
    assert_eq!(ack.updates, 1);

    handle.shutdown();
}

#[test]
fn full_table_drops_new_nodes() {
    init_test_tracing();
    let handle = spawn_collector(1, Duration::from_secs(60), 3);
    let (socket, _) = bind_ephemeral();

    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node: NodeId::from(1),
            parent: None,
            reading: 10,
        }),
    );
    assert_eq!(expect_ack(&socket).updates, 1);

    // Second identity has no free slot: dropped, no ack.
    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node: NodeId::from(2),
            parent: None,
            reading: 11,
        }),
    );
    assert!(
        recv_frame_timeout(&socket, Duration::from_millis(200)).is_none(),
        "table-full insert must not be acked"
    );

    // The tracked node still updates while the table is full.
    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node: NodeId::from(1),
            parent: None,
            reading: 12,
        }),
    );
    assert_eq!(expect_ack(&socket).updates, 2);

    handle.shutdown();
}

#[test]
fn collector_evicts_idle_nodes() {
    init_test_tracing();
    // Fast clock: 40ms ticks, eviction after 2 idle ticks.
    let handle = spawn_collector(10, Duration::from_millis(40), 2);
    let (socket, _) = bind_ephemeral();
    let node = NodeId::from(0xC3);

    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node,
            parent: None,
            reading: 15,
        }),
    );
    assert_eq!(expect_ack(&socket).updates, 1);

    // Let several ticks pass with no updates; the row is evicted and the
    // next report starts a fresh one.
    thread::sleep(Duration::from_millis(300));

    send_frame(
        &socket,
        handle.local_addr(),
        &Frame::Report(ReportFrame {
            node,
            parent: None,
            reading: 16,
        }),
    );
    assert_eq!(
        expect_ack(&socket).updates,
        1,
        "evicted node must re-enter as a fresh row"
    );

    handle.shutdown();
}

#[test]
fn reporter_reports_periodically() {
    init_test_tracing();
    let (socket, collector_addr) = bind_ephemeral();
    let parent: std::net::Ipv6Addr = "fe80::2".parse().unwrap();

    let handle = Reporter::spawn(
        ReporterConfig {
            bind_addr: Endpoint::localhost(0),
            node: Some(NodeId::from(0xD4)),
            send_interval: Duration::from_millis(40),
            reconnect_interval: Duration::from_millis(20),
            buffer_capacity: 10,
        },
        StaticRoute::with_parent(collector_addr, parent),
        FixedReading(21),
    )
    .expect("spawn reporter");

    for _ in 0..2 {
        match recv_frame_timeout(&socket, Duration::from_secs(1)) {
            Some((Frame::Report(report), from)) => {
                assert_eq!(report.node, NodeId::from(0xD4));
                assert_eq!(report.parent, Some(parent));
                assert_eq!(report.reading, 21);
                assert_eq!(from, handle.local_addr());
            }
            other => panic!("expected Report, got {other:?}"),
        }
    }

    handle.shutdown();
}

/// Route whose reachability the test toggles.
struct FlakyRoute {
    root: Endpoint,
    up: Arc<AtomicBool>,
}

impl RouteSource for FlakyRoute {
    fn root(&self) -> Option<Endpoint> {
        self.up.load(Ordering::Relaxed).then_some(self.root)
    }

    fn preferred_parent(&self) -> Option<std::net::Ipv6Addr> {
        None
    }
}

/// Sensor yielding 1, 2, 3, ... so replay order is observable.
struct CountingSensor {
    next: u32,
}

impl ReadingSource for CountingSensor {
    fn read(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

#[test]
fn reporter_buffers_while_down_and_flushes_on_ack() {
    init_test_tracing();
    let (socket, collector_addr) = bind_ephemeral();
    let up = Arc::new(AtomicBool::new(false));

    let handle = Reporter::spawn(
        ReporterConfig {
            bind_addr: Endpoint::localhost(0),
            node: Some(NodeId::from(0xE5)),
            send_interval: Duration::from_millis(40),
            reconnect_interval: Duration::from_millis(20),
            buffer_capacity: 10,
        },
        FlakyRoute {
            root: collector_addr,
            up: Arc::clone(&up),
        },
        CountingSensor { next: 0 },
    )
    .expect("spawn reporter");

    // Let a few send ticks pass while the root is unreachable; readings
    // accumulate locally and nothing reaches the wire.
    thread::sleep(Duration::from_millis(150));
    assert!(
        recv_frame_timeout(&socket, Duration::from_millis(50)).is_none(),
        "nothing must be sent while unreachable"
    );

    // Root comes back: the next report goes out; ack it like a collector.
    up.store(true, Ordering::Relaxed);
    let (frame, reporter_addr) =
        recv_frame_timeout(&socket, Duration::from_secs(1)).expect("report after reconnect");
    let node = match frame {
        Frame::Report(report) => report.node,
        other => panic!("expected Report, got {other:?}"),
    };
    send_frame(
        &socket,
        reporter_addr,
        &Frame::Ack(AckFrame { node, updates: 1 }),
    );

    // The buffered readings replay oldest-first, flagged as batched.
    let mut replayed = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        match recv_frame_timeout(&socket, Duration::from_millis(100)) {
            Some((Frame::Reading(reading), _)) => {
                assert!(reading.batched, "replayed readings must carry BATCHED");
                replayed.push(reading.value);
                if replayed.len() >= 3 {
                    break;
                }
            }
            // Periodic reports keep arriving; skip them.
            Some((Frame::Report(_), _)) => {}
            Some(other) => panic!("unexpected frame {other:?}"),
            None => {}
        }
    }

    assert!(
        replayed.len() >= 3,
        "expected at least 3 replayed readings, got {replayed:?}"
    );
    assert_eq!(replayed[0], 1, "flush must start with the oldest reading");
    for pair in replayed.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "flush must preserve FIFO order");
    }

    handle.shutdown();
}

#[test]
fn daemons_run_end_to_end_and_shut_down_cleanly() {
    init_test_tracing();
    let collector = spawn_collector(10, Duration::from_millis(50), 3);

    let reporter = Reporter::spawn(
        ReporterConfig {
            bind_addr: Endpoint::localhost(0),
            node: None,
            send_interval: Duration::from_millis(40),
            reconnect_interval: Duration::from_millis(20),
            buffer_capacity: 10,
        },
        StaticRoute::new(collector.local_addr()),
        FixedReading(25),
    )
    .expect("spawn reporter");

    // Let a few report/ack cycles and at least one collector tick happen.
    thread::sleep(Duration::from_millis(250));

    reporter.shutdown();
    collector.shutdown();
}
