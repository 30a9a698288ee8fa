//! Framers
//!
//! A framer sits between the raw byte stream of one connection and the
//! request/response objects the server works with. It buffers partial
//! frames, validates headers and checksums, resynchronizes after corruption,
//! and hands every complete request to the caller in arrival order.
//!
//! ## Variants
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┬────────────┐
//! │ Kind     │ ADU                                          │ Transport  │
//! ├──────────┼──────────────────────────────────────────────┼────────────┤
//! │ Socket   │ tid(2) pid(2) len(2) unit(1) PDU             │ TCP, UDP   │
//! │ Rtu      │ unit(1) PDU crc(2, LE)                       │ serial     │
//! │ Ascii    │ ':' hex(unit PDU lrc) CR LF                  │ serial     │
//! └──────────┴──────────────────────────────────────────────┴────────────┘
//! ```
//!
//! A framer instance belongs to exactly one connection. Frames that fail
//! validation or decoding are dropped and never answered.

pub mod ascii;
pub mod checksum;
pub mod rtu;
pub mod socket;

use crate::protocol::{DecodeError, Request, Response, ServerDecoder};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use ascii::AsciiFramer;
pub use rtu::RtuFramer;
pub use socket::SocketFramer;

/// Maximum number of bytes a framer buffers while waiting for a frame to complete.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Reasons a framer drops bytes. These never leave the framer; they are
/// logged and the offending frame is discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// MBAP header with a protocol id other than 0
    #[error("invalid protocol id: {0}")]
    InvalidProtocolId(u16),

    /// MBAP length field outside 2..=254
    #[error("invalid length field: {0}")]
    InvalidLength(u16),

    /// RTU function code whose request length is unknown
    #[error("cannot frame function code {0:#04x}")]
    UnknownFunction(u8),

    /// RTU CRC mismatch
    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    CrcMismatch { expected: u16, received: u16 },

    /// ASCII LRC mismatch
    #[error("LRC mismatch: expected {expected:#04x}, received {received:#04x}")]
    LrcMismatch { expected: u8, received: u8 },

    /// ASCII frame with non-hex characters or an odd number of digits
    #[error("invalid hex encoding")]
    InvalidHex,

    /// Frame shorter than the minimum for its framing
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// Buffered bytes exceed [`MAX_BUFFER_SIZE`]
    #[error("buffer overflow: {size} bytes (max: {max})")]
    BufferOverflow { size: usize, max: usize },

    /// The frame was intact but its PDU did not decode
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Converts between a connection's byte stream and requests/responses.
pub trait Framer: Send {
    /// Appends `data` to the connection buffer and calls `on_request` once
    /// for every complete request, in arrival order. Incomplete trailing
    /// bytes stay buffered for the next call.
    fn process_incoming_packet(&mut self, data: &[u8], on_request: &mut dyn FnMut(Request));

    /// Serializes a response into a complete ADU.
    fn build_packet(&self, response: &Response) -> Bytes;

    /// Discards any buffered partial frame.
    fn reset(&mut self);

    /// Number of bytes currently buffered.
    fn buffered(&self) -> usize;
}

/// Selects the framer a server builds for each connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramerKind {
    /// MBAP framing, the standard for TCP and UDP
    #[default]
    Socket,
    /// Binary serial framing with CRC-16
    Rtu,
    /// Line-oriented serial framing with LRC
    Ascii,
}

impl FramerKind {
    /// Builds a fresh framer of this kind.
    pub fn build(self, decoder: ServerDecoder) -> Box<dyn Framer> {
        match self {
            FramerKind::Socket => Box::new(SocketFramer::new(decoder)),
            FramerKind::Rtu => Box::new(RtuFramer::new(decoder)),
            FramerKind::Ascii => Box::new(AsciiFramer::new(decoder)),
        }
    }
}

impl fmt::Display for FramerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerKind::Socket => write!(f, "socket"),
            FramerKind::Rtu => write!(f, "rtu"),
            FramerKind::Ascii => write!(f, "ascii"),
        }
    }
}

impl FromStr for FramerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socket" | "tcp" | "mbap" => Ok(FramerKind::Socket),
            "rtu" => Ok(FramerKind::Rtu),
            "ascii" => Ok(FramerKind::Ascii),
            other => Err(format!("unknown framer '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestPdu, ResponsePdu};

    #[test]
    fn test_framer_kind_from_str() {
        assert_eq!("socket".parse::<FramerKind>(), Ok(FramerKind::Socket));
        assert_eq!("RTU".parse::<FramerKind>(), Ok(FramerKind::Rtu));
        assert_eq!("ascii".parse::<FramerKind>(), Ok(FramerKind::Ascii));
        assert!("binary".parse::<FramerKind>().is_err());
    }

    #[test]
    fn test_every_kind_frames_its_own_responses() {
        // A response built by a framer must be accepted back by a framer of
        // the same kind (read as a request with the same PDU bytes).
        let request_pdu = RequestPdu::ReadHoldingRegisters {
            address: 0,
            count: 2,
        };
        for kind in [FramerKind::Socket, FramerKind::Rtu, FramerKind::Ascii] {
            let mut framer = kind.build(ServerDecoder::new());
            let request = Request::new(0, 9, request_pdu.clone());
            let response = Response::reply_to(
                &request,
                ResponsePdu::ReadHoldingRegisters {
                    values: vec![1, 2],
                },
            );
            assert!(!framer.build_packet(&response).is_empty(), "{}", kind);

            let mut seen = Vec::new();
            let wire = match kind {
                FramerKind::Socket => socket::encode_request(&request),
                FramerKind::Rtu => rtu::encode_request(&request),
                FramerKind::Ascii => ascii::encode_request(&request),
            };
            framer.process_incoming_packet(&wire, &mut |r| seen.push(r));
            assert_eq!(seen, vec![request], "{}", kind);
            assert_eq!(framer.buffered(), 0);
        }
    }
}
