//! # FlashBus - An Asynchronous Modbus Server
//!
//! FlashBus serves Modbus requests over TCP, UDP and serial lines from an
//! in-memory register store. It is built on Tokio and keeps every piece of
//! per-connection state inside one `ConnectionHandler`.
//!
//! ## Features
//!
//! - **Three framings**: MBAP (socket), RTU and ASCII, selectable per server
//! - **Three transports**: TCP, UDP and serial, sharing one handler design
//! - **Multi-unit store**: one register space per unit id, each behind its own locks
//! - **Well-formed failures**: store errors become exception responses, never
//!   dropped requests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashBus                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Transport   │───>│ Connection  │───>│  Command    │                  │
//! │  │ tcp/udp/ser │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────────────┐ │
//! │  │ Framer                       │  │ StoreContext                     │ │
//! │  │ socket │ rtu │ ascii         │  │ ┌────────┐ ┌────────┐ ┌────────┐ │ │
//! │  │   └─> ServerDecoder          │  │ │Unit 1  │ │Unit 2  │ │...     │ │ │
//! │  └──────────────────────────────┘  │ │RwLocks │ │RwLocks │ │        │ │ │
//! │                                    │ └────────┘ └────────┘ └────────┘ │ │
//! │                                    └──────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashbus::datastore::{DataBlock, MemoryUnit, StoreContext};
//! use flashbus::server::{start_tcp_server, ServerContext};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let unit = MemoryUnit::builder()
//!         .holding_registers(DataBlock::sequential(0, vec![10, 20]))
//!         .build();
//!     let ctx = ServerContext::with_store(Arc::new(StoreContext::new().with_unit(1, unit)));
//!
//!     let runtime = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     start_tcp_server(&runtime, ctx, "127.0.0.1:5020", shutdown)
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: PDU types and the request decoder
//! - [`framer`]: socket, RTU and ASCII framing
//! - [`datastore`]: unit stores and the unit id context
//! - [`device`]: device identity and server id
//! - [`commands`]: execution of each supported function code
//! - [`connection`]: per-connection handler and stream driver
//! - [`server`]: transports and blocking entry points
//! - [`config`]: TOML configuration
//!
//! ## Design Highlights
//!
//! ### Failures Are Answered
//!
//! A request whose unit is unknown, or whose store fails, still gets a
//! response: an exception with `ServerDeviceFailure` carrying the request's
//! transaction id and unit id. Only frames that cannot be framed or decoded
//! go unanswered.
//!
//! ### Per-Connection Framers
//!
//! Each connection owns its framer. Partial frames never leak between
//! connections and never survive a reconnect.

pub mod commands;
pub mod config;
pub mod connection;
pub mod datastore;
pub mod device;
pub mod framer;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{ConfigError, ServerConfig, TransportMode};
pub use connection::{ConnectionHandler, FrameSink, ProtocolHandler, ServerStats};
pub use datastore::{DataBlock, MemoryUnit, StoreContext, StoreError, UnitStore};
pub use device::{ControlBlock, DeviceIdentity};
pub use framer::{FrameError, Framer, FramerKind};
pub use protocol::{DecodeError, ExceptionCode, Request, RequestPdu, Response, ResponsePdu};
pub use server::{
    start_serial_server, start_tcp_server, start_udp_server, ServerContext, ServerError,
};

/// The default port FlashBus listens on (the registered Modbus port)
pub const DEFAULT_PORT: u16 = 502;

/// The default host FlashBus binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default serial line speed
pub const DEFAULT_BAUDRATE: u32 = 19200;

/// Version of FlashBus
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
