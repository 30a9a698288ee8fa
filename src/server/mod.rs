//! Server Module
//!
//! Transport drivers and the blocking entry points that run them.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!                │        ServerContext         │
//!                │  store · framer · identity   │
//!                └──────────────┬───────────────┘
//!                               │ new_handler(peer)
//!         ┌─────────────────────┼─────────────────────┐
//!         ▼                     ▼                     ▼
//! ┌───────────────┐     ┌───────────────┐     ┌───────────────┐
//! │  serve_tcp    │     │  serve_udp    │     │ serve_serial  │
//! │ task / client │     │ handler/peer  │     │ one handler   │
//! └───────────────┘     └───────────────┘     └───────────────┘
//! ```
//!
//! The `start_*` functions block on a runtime owned by the caller. They
//! return when the shutdown future resolves or the transport fails.
//!
//! ## Example
//!
//! ```ignore
//! use flashbus::server::{start_tcp_server, ServerContext};
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//! let shutdown = async {
//!     let _ = tokio::signal::ctrl_c().await;
//! };
//! start_tcp_server(&runtime, ServerContext::default(), "127.0.0.1:502", shutdown)?;
//! ```

pub mod context;
pub mod serial;
pub mod tcp;
pub mod udp;

pub use context::ServerContext;
pub use serial::{open_port, serve_serial};
pub use tcp::serve_tcp;
pub use udp::serve_udp;

use std::future::Future;
use tokio::net::{TcpListener, UdpSocket};
use tokio::runtime::Runtime;
use tracing::info;

/// Errors that stop a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The serial device could not be opened
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// The transport failed while serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves Modbus over TCP on `addr` until `shutdown` resolves.
pub fn start_tcp_server(
    runtime: &Runtime,
    ctx: ServerContext,
    addr: &str,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    runtime.block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!(address = %listener.local_addr()?, framer = %ctx.framer(), "Listening on TCP");

        tokio::select! {
            _ = serve_tcp(listener, ctx) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
        Ok(())
    })
}

/// Serves Modbus over UDP on `addr` until `shutdown` resolves.
pub fn start_udp_server(
    runtime: &Runtime,
    ctx: ServerContext,
    addr: &str,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    runtime.block_on(async move {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!(address = %socket.local_addr()?, framer = %ctx.framer(), "Listening on UDP");

        tokio::select! {
            result = serve_udp(socket, ctx) => result?,
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
        Ok(())
    })
}

/// Serves Modbus on the serial device at `path` until `shutdown` resolves.
pub fn start_serial_server(
    runtime: &Runtime,
    ctx: ServerContext,
    path: &str,
    baud_rate: u32,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    runtime.block_on(async move {
        let port = open_port(path, baud_rate)?;
        info!(device = %path, baud = baud_rate, framer = %ctx.framer(), "Serial port open");

        tokio::select! {
            result = serve_serial(port, path, ctx) => result?,
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_tcp_server_stops_on_shutdown() {
        let runtime = runtime();
        let shutdown = async { tokio::time::sleep(Duration::from_millis(50)).await };

        start_tcp_server(&runtime, ServerContext::default(), "127.0.0.1:0", shutdown).unwrap();
    }

    #[test]
    fn test_start_udp_server_stops_on_shutdown() {
        let runtime = runtime();
        let shutdown = async { tokio::time::sleep(Duration::from_millis(50)).await };

        start_udp_server(&runtime, ServerContext::default(), "127.0.0.1:0", shutdown).unwrap();
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let runtime = runtime();
        let result = start_tcp_server(
            &runtime,
            ServerContext::default(),
            "not an address",
            std::future::pending(),
        );

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServerError>(),
            Some(ServerError::Bind { .. })
        ));
    }
}
