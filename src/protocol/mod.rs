//! Modbus Protocol Implementation
//!
//! This module provides the protocol data units exchanged with Modbus clients.
//!
//! ## Overview
//!
//! Modbus is a request/response protocol: a client sends a function code and
//! its arguments, the server answers with the same function code and the
//! result, or with an exception. The transport (TCP, UDP, serial line) wraps
//! the PDU in an ADU; that wrapping is handled by the `framer` module.
//!
//! ## Modules
//!
//! - `types`: Defines the request/response PDUs and their serialization
//! - `decoder`: Decodes incoming request PDUs
//!
//! ## Example
//!
//! ```ignore
//! use flashbus::protocol::{ServerDecoder, RequestPdu, ResponsePdu};
//!
//! // Decoding an incoming PDU
//! let request = ServerDecoder::new().decode(&[0x03, 0x00, 0x00, 0x00, 0x02])?;
//!
//! // Creating a response
//! let response = ResponsePdu::ReadHoldingRegisters { values: vec![10, 20] };
//! let bytes = response.encode();
//! ```

pub mod decoder;
pub mod types;

// Re-export commonly used types for convenience
pub use decoder::{DecodeError, DecodeResult, ServerDecoder};
pub use types::{ExceptionCode, Request, RequestPdu, Response, ResponsePdu};
