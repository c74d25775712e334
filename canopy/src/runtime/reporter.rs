//! Reporter runtime: the leaf node task.
//!
//! Responsibilities:
//! - Own the reading buffer and the connection state.
//! - On each send tick, report the preferred parent and current reading to
//!   the root when reachable; buffer the reading otherwise.
//! - Retry root resolution on a shorter reconnect tick.
//! - Treat any inbound ack as proof of reachability and flush the buffer,
//!   oldest first, to the ack's sender.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use mio::{Events, Interest, Poll, Token};

use crate::buffer::{ReadingBuffer, DEFAULT_CAPACITY};
use crate::net::{Endpoint, UdpSocket};
use crate::routing::RouteSource;
use crate::sensor::ReadingSource;
use crate::trace::{debug, error, info, warn};
use crate::wire::{self, Frame, NodeId, ReadingFrame, ReportFrame};

const SOCKET: Token = Token(0);

/// Maximum UDP datagram size we'll receive.
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Cap on the poll timeout so shutdown requests are noticed promptly.
const POLL_CAP: Duration = Duration::from_millis(100);

/// Default UDP port the reporter binds.
pub const DEFAULT_PORT: u16 = 8765;

/// Default interval between reports.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between reconnection attempts while unreachable.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for the reporter.
pub struct ReporterConfig {
    /// Address to bind the UDP socket to.
    pub bind_addr: Endpoint,
    /// Node identity; generated randomly when `None`.
    pub node: Option<NodeId>,
    /// Interval between reports.
    pub send_interval: Duration,
    /// Interval between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Reading buffer capacity.
    pub buffer_capacity: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            bind_addr: Endpoint::any(DEFAULT_PORT),
            node: None,
            send_interval: DEFAULT_SEND_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Error starting the reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    /// Failed to bind the UDP socket.
    #[error("failed to bind socket: {0}")]
    Bind(io::Error),
    /// Failed to set up polling.
    #[error("failed to set up polling: {0}")]
    Poll(io::Error),
}

/// The reporter task.
///
/// Generic over its route source and sensor so deployments inject the host
/// routing daemon while tests inject scripted state.
pub struct Reporter<R, S> {
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    local_addr: Endpoint,
    node: NodeId,
    route: R,
    sensor: S,
    buffer: ReadingBuffer,
    /// Resolved destination; `Some` means the root is considered reachable.
    dest: Option<Endpoint>,
    send_interval: Duration,
    reconnect_interval: Duration,
    next_send_at: Instant,
    next_reconnect_at: Instant,
    recv_buf: Vec<u8>,
    encode_buf: Vec<u8>,
}

impl<R: RouteSource, S: ReadingSource> Reporter<R, S> {
    /// Creates a reporter bound to the configured address.
    ///
    /// Attempts one root resolution up front; failure just defers to the
    /// reconnect timer.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or registered for
    /// polling.
    pub fn new(config: ReporterConfig, route: R, sensor: S) -> Result<Self, ReporterError> {
        let mut socket = UdpSocket::bind(config.bind_addr).map_err(|e| {
            error!(bind_addr = %config.bind_addr, error = %e, "failed to bind UDP socket");
            ReporterError::Bind(e)
        })?;
        let local_addr = socket.local_addr().map_err(ReporterError::Bind)?;

        let poll = Poll::new().map_err(ReporterError::Poll)?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)
            .map_err(ReporterError::Poll)?;

        let node = config.node.unwrap_or_else(NodeId::generate);

        let dest = route.root();
        match dest {
            Some(root) => info!(node = %node, root = %root, "root reachable at startup"),
            None => info!(node = %node, "root not reachable yet, will retry"),
        }

        let now = Instant::now();
        Ok(Self {
            socket,
            poll,
            events: Events::with_capacity(16),
            local_addr,
            node,
            route,
            sensor,
            buffer: ReadingBuffer::new(config.buffer_capacity),
            dest,
            send_interval: config.send_interval,
            reconnect_interval: config.reconnect_interval,
            next_send_at: now + config.send_interval,
            next_reconnect_at: now + config.reconnect_interval,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            encode_buf: Vec::with_capacity(wire::MAX_FRAME_SIZE),
        })
    }

    /// Returns the address the reporter is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Returns this reporter's node identity.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Runs the reporter loop until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            let next_deadline = self.next_send_at.min(self.next_reconnect_at);
            let timeout = if now >= next_deadline {
                Duration::ZERO
            } else {
                (next_deadline - now).min(POLL_CAP)
            };

            if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(error = %e, "poll failed");
                continue;
            }

            self.drain_socket();

            if Instant::now() >= self.next_send_at {
                self.on_send_tick();
                self.next_send_at = self.next_send_at + self.send_interval;
            }
            if Instant::now() >= self.next_reconnect_at {
                self.on_reconnect_tick();
                self.next_reconnect_at = self.next_reconnect_at + self.reconnect_interval;
            }
        }
        info!("reporter loop exiting");
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

    /// Sends the current report, or buffers the reading while unreachable.
    fn on_send_tick(&mut self) {
        let reading = self.sensor.read();

        // Re-resolve every tick; the route can lose the root between ticks.
        match self.route.root() {
            Some(root) => {
                self.dest = Some(root);
                let parent = self.route.preferred_parent();
                let frame = Frame::Report(ReportFrame {
                    node: self.node,
                    parent,
                    reading,
                });
                self.send_frame(&frame, root);
                info!(root = %root, reading, parent = ?parent, "sent report");
            }
            None => {
                if self.dest.take().is_some() {
                    info!("root no longer reachable");
                }
                if let Some(_old) = self.buffer.push(reading) {
                    debug!(dropped = _old, "buffer full, overwrote oldest reading");
                }
                info!(
                    reading,
                    buffered = self.buffer.len(),
                    "root unreachable, buffering reading"
                );
            }
        }
    }

    /// Retries root resolution while disconnected.
    fn on_reconnect_tick(&mut self) {
        if self.dest.is_some() {
            return;
        }
        match self.route.root() {
            Some(root) => {
                info!(root = %root, "root reachable again");
                self.dest = Some(root);
            }
            None => debug!("root still unreachable"),
        }
    }

    /// Applies one inbound datagram (already in `recv_buf`).
    fn on_datagram(&mut self, len: usize, from: Endpoint) {
        match wire::decode_frame(&self.recv_buf[..len]) {
            Ok(Frame::Ack(_ack)) => {
                debug!(from = %from, updates = _ack.updates, "ack received");
                self.dest = Some(from);
                self.flush_buffer(from);
            }
            Ok(_) => debug!(from = %from, "ignoring non-ack frame"),
            Err(_e) => warn!(from = %from, error = %_e, "discarding malformed datagram"),
        }
    }

    /// Replays buffered readings, oldest first, to `to`.
    ///
    /// The buffer is emptied by the flush; readings that fail to transmit
    /// are dropped like any other lost datagram.
    fn flush_buffer(&mut self, to: Endpoint) {
        if self.buffer.is_empty() {
            return;
        }

        let node = self.node;
        let Self {
            buffer,
            socket,
            encode_buf,
            ..
        } = self;

        let count = buffer.drain(|value| {
            let frame = Frame::Reading(ReadingFrame {
                node,
                value,
                batched: true,
            });
            wire::encode_frame(&frame, encode_buf);
            match socket.try_send_to(encode_buf, to) {
                Ok(Some(_)) => {}
                Ok(None) => debug!(value, "socket not ready, dropping buffered reading"),
                Err(_e) => warn!(value, error = %_e, "failed to send buffered reading"),
            }
        });
        info!(count, to = %to, "flushed buffered readings");
    }

    /// Encodes and sends one frame, absorbing transient send failures.
    fn send_frame(&mut self, frame: &Frame, to: Endpoint) {
        wire::encode_frame(frame, &mut self.encode_buf);
        match self.socket.try_send_to(&self.encode_buf, to) {
            Ok(Some(_)) => {}
            Ok(None) => debug!(to = %to, "socket not ready, dropping frame"),
            Err(_e) => warn!(to = %to, error = %_e, "send failed"),
        }
    }
}

/// Handle to a running reporter.
///
/// Dropping the handle signals shutdown but does not wait for the thread.
/// Use [`ReporterHandle::shutdown`] for graceful shutdown with join.
pub struct ReporterHandle {
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: Endpoint,
    node: NodeId,
}

impl<R, S> Reporter<R, S>
where
    R: RouteSource + Send + 'static,
    S: ReadingSource + Send + 'static,
{
    /// Spawns the reporter on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or polling cannot be
    /// set up.
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn spawn(
        config: ReporterConfig,
        route: R,
        sensor: S,
    ) -> Result<ReporterHandle, ReporterError> {
        let mut reporter = Self::new(config, route, sensor)?;
        let local_addr = reporter.local_addr();
        let node = reporter.node();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown_flag);
        let handle = thread::Builder::new()
            .name("canopy-reporter".into())
            .spawn(move || {
                info!("reporter thread started");
                reporter.run(&flag);
                info!("reporter thread exiting");
            })
            .expect("failed to spawn reporter thread");

        Ok(ReporterHandle {
            shutdown_flag,
            handle: Some(handle),
            local_addr,
            node,
        })
    }
}

impl ReporterHandle {
    /// Returns the address the reporter is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Endpoint {
        self.local_addr
    }

    /// Returns the reporter's node identity.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Initiates shutdown and waits for the reporter thread to exit.
    pub fn shutdown(mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        // Signal shutdown if not already done.
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}
