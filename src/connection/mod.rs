//! Connection Module
//!
//! This module manages individual client connections to FlashBus.
//! Each connection owns a `ConnectionHandler`, which owns the connection's
//! framer. Transports only move bytes; the handler does everything else.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Transport (server::tcp / udp / serial)           │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ on_open / on_data / on_close
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │   Framer    │───>│  execute()  │───>│   send()    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! └───────────────────────────────────────────────┼─────────────┘
//!                                                 ▼
//!                                           FrameSink
//! ```
//!
//! Stream transports (TCP, serial) share [`StreamConnection`]; UDP drives
//! handlers directly, one per peer address.
//!
//! ## Example
//!
//! ```ignore
//! use flashbus::connection::handle_connection;
//! use flashbus::server::ServerContext;
//!
//! let ctx = ServerContext::default();
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr.to_string(), ctx.new_handler(addr)));
//! ```

pub mod handler;
pub mod stream;

// Re-export commonly used types
pub use handler::{ConnectionHandler, FrameSink, ProtocolHandler, ServerStats};
pub use stream::{handle_connection, ConnectionError, StreamConnection};
