//! Command Handler Module
//!
//! This module implements the request execution layer for FlashBus.
//! It receives decoded request PDUs, executes them against a unit store,
//! and returns the response PDU.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Framer/Decoder │  (framer, protocol modules)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   UnitStore     │  (datastore module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Functions
//!
//! - `0x01`, `0x02`, `0x03`, `0x04`: reads
//! - `0x05`, `0x06`, `0x0F`, `0x10`: writes
//! - `0x17`: combined read/write
//! - `0x11`, `0x2B/0x0E`: device identification

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
