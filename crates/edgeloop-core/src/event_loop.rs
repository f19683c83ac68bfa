// src/event_loop.rs
use crate::config::Config;
use crate::conn::ConnState;
use crate::error::{InitStage, ServerError, ServerResult};
use crate::http::Response;
use crate::listener::Listener;
use crate::metrics::{LoopMetrics, MetricsSnapshot};
use crate::parser;
use crate::registry::{Event, Interest, Registry};
use crate::router::Router;
use crate::slab::ConnectionSlab;
use crate::syscalls::{self, ReadOutcome};
use libc::c_int;
use std::io;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Token of the listening socket.
pub const LISTENER_TOKEN: u64 = u64::MAX;
/// Token of the shutdown wake-up pipe.
pub const WAKER_TOKEN: u64 = u64::MAX - 1;

/// Registrations that are not client connections (listener + waker).
const BASE_REGISTRATIONS: usize = 2;

/// Upper bound on a wait while the idle sweep is enabled.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// What to do with a connection after handling one of its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Keep,
    Close,
}

/// Self-pipe used to interrupt a blocking wait.
#[derive(Debug)]
struct Waker {
    read_fd: c_int,
    write_fd: c_int,
}

impl Waker {
    fn new() -> io::Result<Self> {
        let (read_fd, write_fd) = syscalls::create_pipe()?;
        Ok(Self { read_fd, write_fd })
    }

    fn wake(&self) {
        // A full pipe already guarantees a pending wake-up.
        let _ = syscalls::notify_pipe(self.write_fd);
    }

    fn drain(&self) {
        syscalls::drain_pipe(self.read_fd);
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        syscalls::close(self.read_fd);
        syscalls::close(self.write_fd);
    }
}

/// Requests a graceful stop of a running [`EventLoop`] from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::Release);
        self.waker.wake();
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Single-threaded, edge-triggered connection engine.
///
/// Each accepted connection lives in the slab from accept until its one
/// response has been flushed (or an error or EOF ends it early), then it is
/// deregistered and closed. No state outlives that exchange.
pub struct EventLoop {
    listener: Listener,
    registry: Registry,
    slab: ConnectionSlab,
    router: Router,
    config: Config,
    metrics: Arc<LoopMetrics>,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    batch: Vec<Event>,
}

impl EventLoop {
    pub fn new(listener: Listener, config: Config, router: Router) -> ServerResult<Self> {
        config.validate()?;

        let registry_err = |e| ServerError::init(InitStage::Registry, e);
        let mut registry = Registry::new(config.max_events).map_err(registry_err)?;
        registry
            .register(listener.fd(), LISTENER_TOKEN, Interest::Readable)
            .map_err(registry_err)?;

        let waker = Waker::new().map_err(registry_err)?;
        registry
            .register(waker.read_fd, WAKER_TOKEN, Interest::Readable)
            .map_err(registry_err)?;

        Ok(Self {
            listener,
            registry,
            slab: ConnectionSlab::new(config.max_connections),
            router,
            batch: Vec::with_capacity(config.max_events),
            config,
            metrics: Arc::new(LoopMetrics::new()),
            waker: Arc::new(waker),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            requested: self.shutdown.clone(),
            waker: self.waker.clone(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        self.metrics.clone()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Connections currently held in the table.
    pub fn connections(&self) -> usize {
        self.slab.len()
    }

    /// Client descriptors currently watched by the registry.
    pub fn registered_connections(&self) -> usize {
        self.registry.len().saturating_sub(BASE_REGISTRATIONS)
    }

    /// Run until a shutdown is requested or the readiness wait fails.
    pub fn run(&mut self) -> ServerResult<()> {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "event loop started");
        }

        let timeout = self
            .config
            .idle_timeout
            .map(|idle| idle.min(SWEEP_INTERVAL));

        while !self.shutdown.load(Ordering::Acquire) {
            match self.turn(timeout) {
                Ok(_) => {}
                Err(e) if !e.is_fatal() => warn!(error = %e, "event loop turn failed"),
                Err(e) => {
                    error!(error = %e, "event loop stopped");
                    self.close_all();
                    return Err(e);
                }
            }
        }

        self.close_all();
        let stats = self.stats();
        info!(
            accepted = stats.accepted,
            requests = stats.req_count,
            bytes_sent = stats.bytes_sent,
            "event loop shut down"
        );
        Ok(())
    }

    /// One wait plus the processing of the batch it returned. `None` blocks
    /// until an event arrives. Returns the number of events handled.
    pub fn turn(&mut self, timeout: Option<Duration>) -> ServerResult<usize> {
        let mut batch = std::mem::take(&mut self.batch);
        batch.clear();
        batch.extend_from_slice(self.registry.wait(timeout).map_err(ServerError::Wait)?);

        let now = Instant::now();
        for event in &batch {
            match event.token {
                WAKER_TOKEN => self.waker.drain(),
                LISTENER_TOKEN => {
                    if event.error {
                        warn!("listening socket reported an error condition");
                    }
                    self.accept_drain(now);
                }
                token => self.handle_connection(token as usize, event, now),
            }
        }

        let handled = batch.len();
        self.batch = batch;

        if let Some(idle) = self.config.idle_timeout {
            self.sweep_idle(now, idle);
        }

        Ok(handled)
    }

    /// Accept until the backlog reports would-block. One edge covers every
    /// pending connection, so stopping early would strand the rest.
    fn accept_drain(&mut self, now: Instant) {
        loop {
            match syscalls::accept_connection(self.listener.fd()) {
                Ok(Some(fd)) => self.admit(fd, now),
                Ok(None) => break,
                Err(e) => {
                    let err = ServerError::Accept(e);
                    warn!(error = %err, "accept drain interrupted");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, fd: c_int, now: Instant) {
        if let Err(e) = syscalls::set_nonblocking(fd) {
            let err = ServerError::connection(fd, e);
            warn!(error = %err, "dropping connection");
            syscalls::close(fd);
            return;
        }

        let Some(idx) = self.slab.allocate(fd, now) else {
            warn!(fd, capacity = self.slab.capacity(), "connection table full, dropping connection");
            syscalls::close(fd);
            return;
        };

        if let Err(e) = self.registry.register(fd, idx as u64, Interest::Readable) {
            let err = ServerError::connection(fd, e);
            warn!(error = %err, "dropping connection");
            self.slab.free(idx);
            syscalls::close(fd);
            return;
        }

        self.metrics.inc_conn();
        info!(fd, "connection accepted");
    }

    fn handle_connection(&mut self, idx: usize, event: &Event, now: Instant) {
        // Stale token: the slot was released earlier in this batch.
        let Some(conn) = self.slab.get_mut(idx) else {
            return;
        };
        conn.last_active = now;
        let fd = conn.fd;
        let state = conn.state;

        if event.error {
            warn!(fd, "error or hangup on connection");
            self.close_connection(idx);
            return;
        }

        let result = match state {
            ConnState::Reading if event.readable => self.read_and_respond(idx),
            ConnState::Writing if event.writable => self.flush(idx),
            _ => Ok(Next::Keep),
        };

        match result {
            Ok(Next::Keep) => {}
            Ok(Next::Close) => self.close_connection(idx),
            Err(e) => {
                warn!(error = %e, "closing connection");
                self.close_connection(idx);
            }
        }
    }

    /// Drain the socket, then answer once a request line is available.
    fn read_and_respond(&mut self, idx: usize) -> ServerResult<Next> {
        let limit = self.config.read_buf_size;
        let Some(conn) = self.slab.get_mut(idx) else {
            return Ok(Next::Close);
        };
        let fd = conn.fd;

        while conn.read_buf.len() < limit {
            let filled = conn.read_buf.len();
            conn.read_buf.resize(limit, 0);
            let outcome = match syscalls::read_nonblocking(fd, &mut conn.read_buf[filled..]) {
                Ok(outcome) => outcome,
                Err(e) => return Err(ServerError::connection(fd, e)),
            };

            match outcome {
                ReadOutcome::Data(n) => conn.read_buf.truncate(filled + n),
                ReadOutcome::WouldBlock => {
                    conn.read_buf.truncate(filled);
                    break;
                }
                ReadOutcome::Eof => {
                    conn.read_buf.truncate(filled);
                    conn.peer_closed = true;
                    break;
                }
            }
        }

        if conn.read_buf.is_empty() {
            return Ok(if conn.peer_closed { Next::Close } else { Next::Keep });
        }

        let ready = conn.peer_closed
            || conn.read_buf.len() >= limit
            || parser::has_request_line(&conn.read_buf);
        if !ready {
            // Partial request line; the next edge brings the rest.
            return Ok(Next::Keep);
        }

        let response = match parser::parse_request(&conn.read_buf) {
            Ok(req) => {
                debug!(fd, method = %req.method_str(), path = %req.path_str(), "request");
                self.router.route(&req)
            }
            Err(e) => {
                debug!(fd, error = %e, "malformed request line");
                Response::bad_request()
            }
        };
        debug!(fd, status = response.status, "response");

        conn.write_buf.clear();
        response.encode_into(&mut conn.write_buf);
        conn.write_pos = 0;
        conn.state = ConnState::Writing;
        self.metrics.inc_req();

        self.flush(idx)
    }

    /// Write until the response is out or the socket would block. A short
    /// write switches the registration to writable and resumes later.
    fn flush(&mut self, idx: usize) -> ServerResult<Next> {
        let Some(conn) = self.slab.get_mut(idx) else {
            return Ok(Next::Close);
        };
        let fd = conn.fd;

        while !conn.pending_write().is_empty() {
            match syscalls::write_nonblocking(fd, conn.pending_write()) {
                Ok(Some(n)) if n > 0 => {
                    conn.write_pos += n;
                    self.metrics.add_bytes(n);
                }
                Ok(_) => {
                    self.registry
                        .reregister(fd, idx as u64, Interest::Writable)
                        .map_err(|e| ServerError::connection(fd, e))?;
                    return Ok(Next::Keep);
                }
                Err(e) => return Err(ServerError::connection(fd, e)),
            }
        }

        Ok(Next::Close)
    }

    fn close_connection(&mut self, idx: usize) {
        let Some(conn) = self.slab.get(idx) else {
            return;
        };
        let fd = conn.fd;

        if let Err(e) = self.registry.deregister(fd) {
            warn!(fd, error = %e, "deregister failed");
        }
        syscalls::close(fd);
        self.slab.free(idx);
        self.metrics.dec_conn();
        info!(fd, "connection closed");
    }

    fn sweep_idle(&mut self, now: Instant, idle: Duration) {
        for idx in self.slab.active_indices() {
            let expired = self
                .slab
                .get(idx)
                .is_some_and(|conn| now.saturating_duration_since(conn.last_active) >= idle);
            if expired {
                debug!(idx, "idle timeout");
                self.close_connection(idx);
            }
        }
    }

    fn close_all(&mut self) {
        for idx in self.slab.active_indices() {
            self.close_connection(idx);
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.close_all();
    }
}
