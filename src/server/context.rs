//! Server Context
//!
//! Everything a transport needs to create connection handlers: the shared
//! datastore, the framer kind, the decoder, device metadata and statistics.
//! Cloning a context is cheap; clones share the same store and counters.

use crate::connection::{ConnectionHandler, ServerStats};
use crate::datastore::StoreContext;
use crate::device::{ControlBlock, DeviceIdentity};
use crate::framer::FramerKind;
use crate::protocol::ServerDecoder;
use std::fmt;
use std::sync::Arc;

/// Shared state for one server instance.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Datastore context (shared, never copied)
    store: Arc<StoreContext>,

    /// Framer kind built for each connection
    framer: FramerKind,

    decoder: ServerDecoder,

    /// Device metadata (shared)
    control: Arc<ControlBlock>,

    /// Server statistics (shared)
    stats: Arc<ServerStats>,
}

impl ServerContext {
    /// Creates a context.
    ///
    /// # Arguments
    ///
    /// * `store` - The datastore served to every connection
    /// * `framer` - The framing used on the wire
    /// * `identity` - Identity fields that override the defaults, if any
    pub fn new(
        store: Arc<StoreContext>,
        framer: FramerKind,
        identity: Option<DeviceIdentity>,
    ) -> Self {
        Self {
            store,
            framer,
            decoder: ServerDecoder::new(),
            control: Arc::new(ControlBlock::with_identity(identity.as_ref())),
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Creates a context serving `store` with socket framing.
    pub fn with_store(store: Arc<StoreContext>) -> Self {
        Self::new(store, FramerKind::Socket, None)
    }

    pub fn with_framer(mut self, framer: FramerKind) -> Self {
        self.framer = framer;
        self
    }

    /// Applies identity fields over the defaults.
    pub fn with_identity(mut self, identity: &DeviceIdentity) -> Self {
        self.control = Arc::new(ControlBlock::with_identity(Some(identity)));
        self
    }

    /// Creates the handler for a newly accepted connection.
    pub fn new_handler(&self, peer: impl fmt::Display) -> ConnectionHandler {
        ConnectionHandler::new(
            peer.to_string(),
            self.framer,
            self.decoder,
            Arc::clone(&self.store),
            Arc::clone(&self.control),
            Arc::clone(&self.stats),
        )
    }

    pub fn store(&self) -> &Arc<StoreContext> {
        &self.store
    }

    pub fn framer(&self) -> FramerKind {
        self.framer
    }

    pub fn control(&self) -> &ControlBlock {
        &self.control
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }
}

impl Default for ServerContext {
    /// An empty datastore with socket framing. Every request is answered
    /// with `ServerDeviceFailure`.
    fn default() -> Self {
        Self::with_store(Arc::new(StoreContext::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ProtocolHandler;
    use crate::datastore::MemoryUnit;
    use crate::framer::rtu;
    use crate::protocol::{ExceptionCode, Request, RequestPdu};
    use bytes::Bytes;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_defaults() {
        let ctx = ServerContext::default();
        assert_eq!(ctx.framer(), FramerKind::Socket);
        assert!(ctx.store().is_empty());
        assert_eq!(ctx.control().identity(), &DeviceIdentity::default());
    }

    #[test]
    fn test_default_context_fails_every_unit() {
        let ctx = ServerContext::default();
        let handler = ctx.new_handler("test");
        let request = Request::new(
            5,
            1,
            RequestPdu::ReadCoils {
                address: 0,
                count: 1,
            },
        );

        let response = handler.execute(&request);
        assert_eq!(
            response.pdu.exception_code(),
            Some(ExceptionCode::ServerDeviceFailure)
        );
    }

    #[test]
    fn test_identity_override() {
        let identity = DeviceIdentity {
            vendor_name: "Acme".to_string(),
            ..Default::default()
        };
        let ctx = ServerContext::default().with_identity(&identity);
        assert_eq!(ctx.control().identity().vendor_name, "Acme");
        assert_eq!(&ctx.control().server_id()[..], b"Acme");
    }

    #[test]
    fn test_handlers_share_store_and_stats() {
        let store = Arc::new(StoreContext::new().with_unit(1, MemoryUnit::with_size(10)));
        let ctx = ServerContext::with_store(Arc::clone(&store)).with_framer(FramerKind::Rtu);

        let mut a = ctx.new_handler("a");
        let mut b = ctx.new_handler("b");
        a.on_open();
        b.on_open();

        let write = Request::new(
            0,
            1,
            RequestPdu::WriteSingleRegister {
                address: 3,
                value: 99,
            },
        );
        let read = Request::new(
            0,
            1,
            RequestPdu::ReadHoldingRegisters {
                address: 3,
                count: 1,
            },
        );

        let mut out: Vec<Bytes> = Vec::new();
        a.on_data(&rtu::encode_request(&write), &mut out);
        b.on_data(&rtu::encode_request(&read), &mut out);

        assert_eq!(out.len(), 2);
        // unit, fc, byte count, value
        assert_eq!(&out[1][..5], &[0x01, 0x03, 0x02, 0x00, 99]);
        assert_eq!(ctx.stats().active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(ctx.stats().requests_processed.load(Ordering::Relaxed), 2);
        assert_eq!(Arc::strong_count(&store), 4);
    }
}
