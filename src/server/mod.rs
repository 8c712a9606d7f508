//! Process pipelined HTTP connections on the server.
//!
//! A [`Connection`] owns one accepted socket and the two tasks servicing it.
//! The socket listener reads and decodes requests, spawning one handler task
//! per request and queueing a slot for it; the response sender joins each
//! handler in queue order and writes the responses back, so the peer always
//! observes responses in the order it sent the requests.

pub(crate) mod decode;
pub(crate) mod encode;
mod reader;
mod writer;

pub use decode::ParserConfig;

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_std::io::{Read, Write};
use async_std::task;
use futures_lite::future;

use crate::handler::HandlerRegistry;
use crate::pipeline;
use crate::stats::Stats;
use crate::stop::{StopSource, StopToken, Stopper};

/// Per-connection tunables.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// How many bytes to read from the socket per read call.
    pub in_buffer_size: usize,
    /// Capacity of the request pipeline; once it is full, reading from the
    /// socket pauses and TCP backpressure takes over.
    pub requests_queue_size_threshold: usize,
    /// Tear the connection down after this much read inactivity.
    pub read_timeout: Option<Duration>,
    /// Limits applied while decoding requests.
    pub parser: ParserConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            in_buffer_size: 32 * 1024,
            requests_queue_size_threshold: 100,
            read_timeout: None,
            parser: ParserConfig::default(),
        }
    }
}

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// One accepted client connection and the tasks servicing it.
///
/// The response sender task holds the only long-lived strong reference, so
/// the connection object lives exactly as long as it is being serviced; the
/// handle returned by [`create`][Connection::create] may be dropped as soon
/// as [`start`][Connection::start] has been called.
pub struct Connection<IO> {
    config: ConnectionConfig,
    io: IO,
    peer_addr: String,
    registry: Arc<HandlerRegistry>,
    stats: Arc<Stats>,
    stop: StopSource,
    on_close: Mutex<Option<CloseCallback>>,
}

impl<IO> Connection<IO>
where
    IO: Read + Write + Clone + Send + Sync + Unpin + 'static,
{
    /// Takes ownership of an accepted socket.
    pub fn create(
        config: ConnectionConfig,
        io: IO,
        peer_addr: String,
        registry: Arc<HandlerRegistry>,
        stats: Arc<Stats>,
    ) -> Arc<Self> {
        log::debug!("incoming connection from {}", peer_addr);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);
        stats.connections_created.fetch_add(1, Ordering::Relaxed);

        Arc::new(Self {
            config,
            io,
            peer_addr,
            registry,
            stats,
            stop: StopSource::new(),
            on_close: Mutex::new(None),
        })
    }

    /// Registers a callback invoked once, after teardown has finished.
    ///
    /// The callback must not panic; it runs inside the response sender task.
    pub fn set_on_close(&self, callback: impl FnOnce() + Send + 'static) {
        *self.on_close.lock().unwrap() = Some(Box::new(callback));
    }

    /// Spawns the socket listener and the response sender.
    ///
    /// Consumes the handle; clone the [`Arc`] first if the connection needs
    /// to be reachable afterwards, e.g. to [`stop`][Connection::stop] it.
    pub fn start(self: Arc<Self>) {
        log::trace!("starting request listener for {}", self.peer_addr);

        let (producer, consumer) = pipeline::bounded(self.config.requests_queue_size_threshold);
        let stopper = Stopper::new(self.stop.clone());
        let socket_listener = task::spawn(reader::listen(
            self.io.clone(),
            self.peer_addr.clone(),
            self.config.clone(),
            self.registry.clone(),
            self.stats.clone(),
            producer,
            stopper,
        ));

        log::trace!("started request listener for {}", self.peer_addr);

        // The response sender is detached and never cancelled, only
        // signalled, so teardown always runs. It keeps `self` alive.
        task::spawn(writer::send_responses(self, socket_listener, consumer));
    }

    /// Requests the connection to wind down.
    ///
    /// In-flight handlers are cancelled; a response that already started
    /// going out still finishes. Teardown completes asynchronously and ends
    /// with the `on_close` callback.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// The address of the peer, for diagnostics.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub(crate) fn socket(&self) -> IO {
        self.io.clone()
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(crate) fn stop_token(&self) -> StopToken {
        self.stop.token()
    }

    /// Final teardown, run by the response sender once the pipeline drained.
    pub(crate) async fn shutdown(&self) {
        log::trace!(
            "terminating requests processing for peer {}",
            self.peer_addr
        );

        let mut io = self.io.clone();
        let _ = future::poll_fn(|cx| Pin::new(&mut io).poll_close(cx)).await;

        self.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.stats.connections_closed.fetch_add(1, Ordering::Relaxed);

        let callback = self.on_close.lock().unwrap().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl<IO> fmt::Debug for Connection<IO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
