//! Collector runtime: the root/monitor node task.
//!
//! Responsibilities:
//! - Own canonical state: the node table and the liveness clock.
//! - Decode and validate inbound frames; upsert rows; ack valid updates.
//! - On each tick: advance the clock, evict stale rows, log the table.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use mio::{Events, Interest, Poll, Token};

use crate::net::{Endpoint, UdpSocket};
use crate::table::{NodeTable, DEFAULT_CAPACITY};
use crate::tick::{TickInstant, TickSpan};
use crate::trace::{debug, error, info, warn};
use crate::wire::{self, AckFrame, Frame, NodeId};

const SOCKET: Token = Token(0);

/// Maximum UDP datagram size we'll receive. Valid frames are tiny, but an
/// oversized datagram must be read in full to be rejected by length.
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Cap on the poll timeout so shutdown requests are noticed promptly even
/// with long tick intervals.
const POLL_CAP: Duration = Duration::from_millis(100);

/// Default UDP port the collector listens on.
pub const DEFAULT_PORT: u16 = 5678;

/// Default report/eviction interval (one tick).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of ticks without an update before a row is evicted.
pub const DEFAULT_TIMEOUT_TICKS: u64 = 3;

/// Configuration for the collector.
pub struct CollectorConfig {
    /// Address to bind the UDP socket to.
    pub bind_addr: Endpoint,
    /// Node table slot count.
    pub capacity: usize,
    /// How often the clock ticks (evictions + report).
    pub tick_interval: Duration,
    /// Ticks without an update before a row is evicted.
    pub timeout_ticks: u64,
    /// Kernel receive buffer size override, if any.
    pub recv_buffer_size: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: Endpoint::any(DEFAULT_PORT),
            capacity: DEFAULT_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            recv_buffer_size: None,
        }
    }
}

/// Error starting the collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Failed to bind or configure the UDP socket.
    #[error("failed to bind socket: {0}")]
    Bind(io::Error),
    /// Failed to set up polling.
    #[error("failed to set up polling: {0}")]
    Poll(io::Error),
}

/// The collector task.
///
/// Owns the node table exclusively; nothing outside the task can reach it.
/// Use [`Collector::spawn`] to run it on a dedicated thread, or construct
/// with [`Collector::new`] and call [`Collector::run`] to drive it on the
/// current thread.
pub struct Collector {
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    local_addr: Endpoint,
    table: NodeTable,
    now: TickInstant,
    timeout: TickSpan,
    tick_interval: Duration,
    next_tick_at: Instant,
    recv_buf: Vec<u8>,
    encode_buf: Vec<u8>,
}

impl Collector {
    /// Creates a collector bound to the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound/configured or
    /// registered for polling.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectorError> {
        let mut socket = UdpSocket::bind(config.bind_addr).map_err(|e| {
            error!(bind_addr = %config.bind_addr, error = %e, "failed to bind UDP socket");
            CollectorError::Bind(e)
        })?;
        if let Some(size) = config.recv_buffer_size {
            socket
                .set_recv_buffer_size(size)
                .map_err(CollectorError::Bind)?;
        }
        let local_addr = socket.local_addr().map_err(CollectorError::Bind)?;

        let poll = Poll::new().map_err(CollectorError::Poll)?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)
            .map_err(CollectorError::Poll)?;

        info!(
            bind_addr = %local_addr,
            capacity = config.capacity,
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            timeout_ticks = config.timeout_ticks,
            "collector listening"
        );

        Ok(Self {
            socket,
            poll,
            events: Events::with_capacity(16),
            local_addr,
            table: NodeTable::new(config.capacity),
            now: TickInstant::ZERO,
            timeout: TickSpan::new(config.timeout_ticks),
            tick_interval: config.tick_interval,
            next_tick_at: Instant::now() + config.tick_interval,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            encode_buf: Vec::with_capacity(wire::MAX_FRAME_SIZE),
        })
    }

    /// Returns the address the collector is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Read-only view of the node table.
    #[must_use]
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Runs the collector loop until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            let timeout = if now >= self.next_tick_at {
                Duration::ZERO
            } else {
                (self.next_tick_at - now).min(POLL_CAP)
            };

            if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %e, "poll failed");
                continue;
            }

            self.drain_socket();

            if Instant::now() >= self.next_tick_at {
                self.on_tick();
                self.next_tick_at = self.next_tick_at + self.tick_interval;
            }
        }
        info!("collector loop exiting");
    }

    /// Receives and applies every queued datagram.
    fn drain_socket(&mut self) {
        loop {
            match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok(Some((len, from))) => self.on_datagram(len, from),
                Ok(None) => return,
                Err(_e) => {
                    warn!(error = %_e, "recv failed");
                    return;
                }
            }
        }
    }

    /// Applies one inbound datagram (already in `recv_buf`).
    fn on_datagram(&mut self, len: usize, from: Endpoint) {
        let frame = match wire::decode_frame(&self.recv_buf[..len]) {
            Ok(f) => f,
            Err(_e) => {
                warn!(from = %from, error = %_e, "discarding malformed datagram");
                return;
            }
        };

        match frame {
            Frame::Report(report) => {
                let updates = match self.table.upsert(report.node, from, self.now) {
                    Ok(rec) => {
                        rec.parent = report.parent;
                        rec.last_reading = Some(report.reading);
                        rec.updates
                    }
                    Err(_e) => {
                        warn!(from = %from, error = %_e, "dropping report");
                        return;
                    }
                };
                info!(
                    node = %report.node,
                    from = %from,
                    parent = ?report.parent,
                    reading = report.reading,
                    "node report"
                );
                self.send_ack(from, report.node, updates);
            }
            Frame::Reading(reading) => {
                let updates = match self.table.upsert(reading.node, from, self.now) {
                    Ok(rec) => {
                        rec.last_reading = Some(reading.value);
                        rec.updates
                    }
                    Err(_e) => {
                        warn!(from = %from, error = %_e, "dropping reading");
                        return;
                    }
                };
                if reading.batched {
                    info!(node = %reading.node, value = reading.value, "replayed reading");
                } else {
                    info!(node = %reading.node, value = reading.value, "reading");
                }
                self.send_ack(from, reading.node, updates);
            }
            Frame::Ack(_ack) => {
                debug!(from = %from, node = %_ack.node, "ignoring stray ack");
            }
        }
    }

    /// Acknowledges a valid frame back to its sender.
    fn send_ack(&mut self, to: Endpoint, node: NodeId, updates: u64) {
        let frame = Frame::Ack(AckFrame {
            node,
            updates: updates as u32,
        });
        wire::encode_frame(&frame, &mut self.encode_buf);
        match self.socket.try_send_to(&self.encode_buf, to) {
            Ok(Some(_)) => {}
            Ok(None) => debug!(to = %to, "socket not ready, dropping ack"),
            Err(_e) => warn!(to = %to, error = %_e, "failed to send ack"),
        }
    }

    /// Advances the clock, evicts stale rows, and logs the live table.
    fn on_tick(&mut self) {
        self.now = self.now + TickSpan::ONE;
        let now = self.now;
        let timeout = self.timeout;

        self.table.evict_expired(now, timeout, |_rec| {
            info!(node = %_rec.node, endpoint = %_rec.endpoint, "evicting inactive node");
        });

        info!(tick = now.get(), live = self.table.len(), "tick report");
        let mut sum: u64 = 0;
        let mut samples: u32 = 0;
        for rec in self.table.iter() {
            info!(
                node = %rec.node,
                endpoint = %rec.endpoint,
                parent = ?rec.parent,
                reading = ?rec.last_reading,
                updates = rec.updates,
                age_ticks = now.since(rec.last_update).get(),
                "live node"
            );
            if let Some(v) = rec.last_reading {
                sum += u64::from(v);
                samples += 1;
            }
        }
        if samples > 0 {
            info!(
                average = sum as f64 / f64::from(samples),
                samples, "reading average"
            );
        }
    }
}

/// Handle to a running collector.
///
/// Dropping the handle signals shutdown but does not wait for the thread.
/// Use [`CollectorHandle::shutdown`] for graceful shutdown with join.
pub struct CollectorHandle {
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: Endpoint,
}

impl Collector {
    /// Spawns the collector on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or polling cannot be
    /// set up.
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn spawn(config: CollectorConfig) -> Result<CollectorHandle, CollectorError> {
        let mut collector = Self::new(config)?;
        let local_addr = collector.local_addr();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown_flag);
        let handle = thread::Builder::new()
            .name("canopy-collector".into())
            .spawn(move || {
                info!("collector thread started");
                collector.run(&flag);
                info!("collector thread exiting");
            })
            .expect("failed to spawn collector thread");

        Ok(CollectorHandle {
            shutdown_flag,
            handle: Some(handle),
            local_addr,
        })
    }
}

impl CollectorHandle {
    /// Returns the address the collector is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Initiates shutdown and waits for the collector thread to exit.
    pub fn shutdown(mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        // Signal shutdown if not already done.
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}
