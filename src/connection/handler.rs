//! Connection Handler
//!
//! One `ConnectionHandler` exists per client connection (per peer address for
//! UDP, per port for serial). It owns the connection's framer and turns the
//! bytes it is fed into responses written to a [`FrameSink`].
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Transport accepts a client
//!        │
//!        ▼
//! 2. on_open()          allocate a fresh framer
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  on_data(bytes, sink)        │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Framer: bytes → Request │ │  zero, one or many per chunk
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ execute(Request)        │ │  store lookup + CommandHandler
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ send(Response, sink)    │ │  Framer: Response → bytes
//!    │  └─────────────────────────┘ │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. on_close()         drop the framer and any partial frame
//! ```
//!
//! The handler does no I/O of its own. Transport drivers read bytes, call
//! `on_data`, and write whatever landed in the sink.

use crate::commands::CommandHandler;
use crate::datastore::StoreContext;
use crate::device::ControlBlock;
use crate::framer::{Framer, FramerKind};
use crate::protocol::{Request, Response, ServerDecoder};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Server-wide statistics, shared by every connection.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total number of connections opened
    pub connections_accepted: AtomicU64,
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Total requests executed
    pub requests_processed: AtomicU64,
    /// Requests answered with an exception response
    pub exceptions_returned: AtomicU64,
    /// Total bytes fed to framers
    pub bytes_read: AtomicU64,
    /// Total bytes of framed responses
    pub bytes_written: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exception_returned(&self) {
        self.exceptions_returned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Destination for framed responses.
pub trait FrameSink {
    fn push_frame(&mut self, frame: Bytes);
}

/// Collects frames individually; used by datagram transports.
impl FrameSink for Vec<Bytes> {
    fn push_frame(&mut self, frame: Bytes) {
        self.push(frame);
    }
}

/// Concatenates frames; used by stream transports to write once per read.
impl FrameSink for BytesMut {
    fn push_frame(&mut self, frame: Bytes) {
        self.extend_from_slice(&frame);
    }
}

/// Per-connection callbacks driven by a transport.
pub trait ProtocolHandler: Send {
    /// The connection is established.
    fn on_open(&mut self);

    /// Bytes arrived from the peer; responses are pushed to `sink`.
    fn on_data(&mut self, data: &[u8], sink: &mut dyn FrameSink);

    /// The connection is gone.
    fn on_close(&mut self);

    /// Bytes of partial frame held between calls.
    fn buffered(&self) -> usize {
        0
    }
}

/// Serves one client connection.
pub struct ConnectionHandler {
    /// Peer label for logging (socket address or device path)
    peer: String,

    /// Framer kind allocated on open
    kind: FramerKind,

    decoder: ServerDecoder,

    /// The connection's framer, present between open and close
    framer: Option<Box<dyn Framer>>,

    /// Datastore context (shared)
    store: Arc<StoreContext>,

    commands: CommandHandler,

    /// Server statistics (shared)
    stats: Arc<ServerStats>,
}

impl ConnectionHandler {
    /// Creates a handler. No framer exists until [`ProtocolHandler::on_open`].
    pub fn new(
        peer: impl Into<String>,
        kind: FramerKind,
        decoder: ServerDecoder,
        store: Arc<StoreContext>,
        control: Arc<ControlBlock>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            peer: peer.into(),
            kind,
            decoder,
            framer: None,
            store,
            commands: CommandHandler::new(control),
            stats,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True between `on_open` and `on_close`.
    pub fn is_open(&self) -> bool {
        self.framer.is_some()
    }

    /// Discards any partial frame without closing the connection.
    pub fn reset_framer(&mut self) {
        if let Some(framer) = self.framer.as_mut() {
            framer.reset();
        }
    }

    /// Executes one request and builds its response.
    ///
    /// A missing unit or a failing store produces a `ServerDeviceFailure`
    /// exception. The response always carries the request's transaction id
    /// and unit id.
    pub fn execute(&self, request: &Request) -> Response {
        let result = self
            .store
            .get(request.unit_id)
            .and_then(|store| self.commands.execute(&request.pdu, store));

        let pdu = match result {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!(
                    client = %self.peer,
                    tid = request.transaction_id,
                    unit = request.unit_id,
                    error = %e,
                    "Execution failed"
                );
                request.pdu.exception(e.exception_code())
            }
        };

        self.stats.request_processed();
        if pdu.is_exception() {
            self.stats.exception_returned();
        }

        Response::reply_to(request, pdu)
    }

    /// Frames `response` and hands the bytes to `sink`.
    pub fn send(&self, response: &Response, sink: &mut dyn FrameSink) {
        let Some(framer) = self.framer.as_ref() else {
            debug!(client = %self.peer, "Connection closed, dropping response");
            return;
        };

        let packet = framer.build_packet(response);
        self.stats.bytes_written(packet.len());
        trace!(
            client = %self.peer,
            response = %response,
            frame = %hex::encode(&packet),
            "Sending response"
        );
        sink.push_frame(packet);
    }
}

impl ProtocolHandler for ConnectionHandler {
    fn on_open(&mut self) {
        info!(client = %self.peer, framer = %self.kind, "Client connected");
        self.stats.connection_opened();
        self.framer = Some(self.kind.build(self.decoder));
    }

    fn on_data(&mut self, data: &[u8], sink: &mut dyn FrameSink) {
        let Some(framer) = self.framer.as_mut() else {
            debug!(client = %self.peer, bytes = data.len(), "Ignoring data on closed connection");
            return;
        };

        self.stats.bytes_read(data.len());
        trace!(client = %self.peer, bytes = data.len(), "Read data");

        let mut requests = Vec::new();
        framer.process_incoming_packet(data, &mut |request| requests.push(request));

        for request in requests {
            let response = self.execute(&request);
            self.send(&response, sink);
        }
    }

    fn on_close(&mut self) {
        if let Some(framer) = self.framer.take() {
            info!(
                client = %self.peer,
                discarded = framer.buffered(),
                "Client disconnected"
            );
            self.stats.connection_closed();
        }
    }

    fn buffered(&self) -> usize {
        self.framer.as_ref().map_or(0, |framer| framer.buffered())
    }
}
