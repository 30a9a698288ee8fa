//! UDP transport.
//!
//! Each peer address gets its own connection handler, created on its first
//! datagram. Datagram boundaries are frame boundaries: whatever a datagram
//! leaves buffered is discarded before the next one from the same peer.

use crate::connection::{ConnectionHandler, ProtocolHandler};
use crate::server::{ServerContext, ServerError};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

/// Largest datagram accepted
const MAX_DATAGRAM_SIZE: usize = 2048;

/// Peer handlers kept before the table is flushed
const MAX_PEERS: usize = 1024;

/// Serves datagrams until the socket fails.
pub async fn serve_udp(socket: UdpSocket, ctx: ServerContext) -> Result<(), ServerError> {
    let mut peers: HashMap<SocketAddr, ConnectionHandler> = HashMap::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut frames: Vec<Bytes> = Vec::new();

    loop {
        let (n, peer) = socket.recv_from(&mut buf).await?;
        trace!(client = %peer, bytes = n, "Received datagram");

        if !peers.contains_key(&peer) && peers.len() >= MAX_PEERS {
            warn!(peers = peers.len(), "Peer table full, dropping idle handlers");
            for handler in peers.values_mut() {
                handler.on_close();
            }
            peers.clear();
        }

        let handler = peers.entry(peer).or_insert_with(|| {
            let mut handler = ctx.new_handler(peer);
            handler.on_open();
            handler
        });

        handler.on_data(&buf[..n], &mut frames);
        handler.reset_framer();

        for frame in frames.drain(..) {
            if let Err(e) = socket.send_to(&frame, peer).await {
                debug!(client = %peer, error = %e, "Failed to send response");
            }
        }
    }
}
