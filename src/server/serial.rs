//! Serial transport: the open port is one logical connection for its whole life.

use crate::connection::{ConnectionError, StreamConnection};
use crate::server::{ServerContext, ServerError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Opens `path` at `baud_rate` for async use.
pub fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream, ServerError> {
    tokio_serial::new(path, baud_rate)
        .open_native_async()
        .map_err(|source| ServerError::SerialOpen {
            path: path.to_string(),
            source,
        })
}

/// Serves one serial line until it fails or reports end of stream.
///
/// `port` is any byte stream; in production it is a [`SerialStream`].
pub async fn serve_serial<S>(port: S, name: &str, ctx: ServerContext) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ctx.new_handler(name);
    match StreamConnection::new(port, name, handler).run().await {
        Ok(())
        | Err(ConnectionError::ClientDisconnected)
        | Err(ConnectionError::UnexpectedEof(_)) => {
            info!(device = %name, "Serial line closed");
            Ok(())
        }
        Err(ConnectionError::IoError(e)) => Err(ServerError::Io(e)),
    }
}
