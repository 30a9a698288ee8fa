//! TCP transport: one task and one connection handler per accepted client.

use crate::connection::handle_connection;
use crate::server::ServerContext;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// Accepts connections forever, spawning a task for each one.
///
/// Accept failures are logged and the loop continues.
pub async fn serve_tcp(listener: TcpListener, ctx: ServerContext) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }

                // Create a handler for this connection
                let handler = ctx.new_handler(addr);

                // Spawn a task to handle this connection
                tokio::spawn(handle_connection(stream, addr.to_string(), handler));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
