//! Stream Driver
//!
//! Drives a [`ProtocolHandler`] over any byte stream: a TCP connection or an
//! open serial port. Bytes are read into a bounded buffer, fed to the handler,
//! and every frame produced by one read is written back with a single flush.
//!
//! ## Buffer Management
//!
//! The read buffer only stages bytes between the socket and the handler. The
//! framer inside the handler does all reassembly, so partial frames and
//! pipelined frames need no special treatment here.

use crate::connection::handler::ProtocolHandler;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, trace, warn};

/// Read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that end a stream connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network or serial line issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Peer closed the stream
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Peer closed the stream in the middle of a frame
    #[error("Unexpected end of stream with {0} bytes of partial frame")]
    UnexpectedEof(usize),
}

/// Connects a byte stream to a protocol handler.
pub struct StreamConnection<S, H> {
    stream: BufWriter<S>,

    /// Peer label for logging
    peer: String,

    /// Staging buffer for incoming bytes
    read_buf: BytesMut,

    /// Frames produced by the last read
    write_buf: BytesMut,

    handler: H,
}

impl<S, H> StreamConnection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: ProtocolHandler,
{
    pub fn new(stream: S, peer: impl Into<String>, handler: H) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            handler,
        }
    }

    /// Runs the connection until the peer disconnects or an I/O error occurs.
    ///
    /// `on_open` is called first and `on_close` always runs last.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.handler.on_open();

        let result = self.main_loop().await;

        match &result {
            Ok(()) => {}
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.peer, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.peer, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Connection error"),
        }

        self.handler.on_close();
        result
    }

    /// The read-dispatch-write loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.read_buf.clear();
            let n = self.stream.get_mut().read_buf(&mut self.read_buf).await?;

            if n == 0 {
                let pending = self.handler.buffered();
                return if pending > 0 {
                    Err(ConnectionError::UnexpectedEof(pending))
                } else {
                    Err(ConnectionError::ClientDisconnected)
                };
            }
            trace!(client = %self.peer, bytes = n, "Read data");

            self.handler.on_data(&self.read_buf, &mut self.write_buf);

            if !self.write_buf.is_empty() {
                self.send_frames().await?;
            }
        }
    }

    /// Writes every pending frame with one flush.
    async fn send_frames(&mut self) -> Result<(), ConnectionError> {
        let frames = self.write_buf.split();
        self.stream.write_all(&frames).await?;
        self.stream.flush().await?;
        trace!(client = %self.peer, bytes = frames.len(), "Sent response");
        Ok(())
    }
}

/// Runs a stream connection to completion, swallowing ordinary disconnects.
pub async fn handle_connection<S, H>(stream: S, peer: String, handler: H)
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: ProtocolHandler,
{
    let connection = StreamConnection::new(stream, peer.clone(), handler);
    if let Err(e) = connection.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %peer, error = %e, "Connection ended with error");
            }
        }
    }
}
