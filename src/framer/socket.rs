//! Socket (MBAP) Framer
//!
//! The standard framing for Modbus over TCP and UDP. Every ADU starts with a
//! seven byte MBAP header:
//!
//! ```text
//! ┌────────────────┬─────────────┬────────────┬─────────┬──────────┐
//! │ transaction id │ protocol id │ length     │ unit id │ PDU      │
//! │ u16 BE         │ u16 BE = 0  │ u16 BE     │ u8      │ len - 1  │
//! └────────────────┴─────────────┴────────────┴─────────┴──────────┘
//! ```
//!
//! `length` counts the unit id and the PDU. Because the header carries the
//! frame length, partial and pipelined deliveries are reassembled exactly.
//! There is no checksum; a header with a bad protocol id or length means the
//! stream is out of sync and everything buffered is discarded.

use crate::framer::{FrameError, Framer, MAX_BUFFER_SIZE};
use crate::protocol::types::MAX_PDU_SIZE;
use crate::protocol::{Request, Response, ServerDecoder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

/// Length of the MBAP header including the unit id.
pub const MBAP_HEADER_LEN: usize = 7;

/// Largest legal value of the MBAP length field (unit id + PDU).
pub const MAX_MBAP_LENGTH: u16 = 1 + MAX_PDU_SIZE as u16;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 512;

/// A parsed MBAP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parses the header from the first seven bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < MBAP_HEADER_LEN {
            return None;
        }
        Some(Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        })
    }

    /// Checks the protocol id and that the length covers at least a function code.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.protocol_id != 0 {
            return Err(FrameError::InvalidProtocolId(self.protocol_id));
        }
        if !(2..=MAX_MBAP_LENGTH).contains(&self.length) {
            return Err(FrameError::InvalidLength(self.length));
        }
        Ok(())
    }

    /// Total ADU length described by this header.
    pub fn frame_len(&self) -> usize {
        MBAP_HEADER_LEN - 1 + self.length as usize
    }
}

/// MBAP framer for stream and datagram sockets.
#[derive(Debug)]
pub struct SocketFramer {
    decoder: ServerDecoder,
    buffer: BytesMut,
}

impl SocketFramer {
    pub fn new(decoder: ServerDecoder) -> Self {
        Self {
            decoder,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
        }
    }

    /// Attempts to split one complete frame off the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed.
    fn next_frame(&mut self) -> Result<Option<(MbapHeader, Bytes)>, FrameError> {
        let Some(header) = MbapHeader::parse(&self.buffer) else {
            return Ok(None);
        };
        header.validate()?;

        let frame_len = header.frame_len();
        if self.buffer.len() < frame_len {
            trace!(
                needed = frame_len,
                buffered = self.buffer.len(),
                "Incomplete frame, need more data"
            );
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(frame_len);
        frame.advance(MBAP_HEADER_LEN);
        Ok(Some((header, frame.freeze())))
    }
}

impl Framer for SocketFramer {
    fn process_incoming_packet(&mut self, data: &[u8], on_request: &mut dyn FnMut(Request)) {
        self.buffer.extend_from_slice(data);

        loop {
            match self.next_frame() {
                Ok(Some((header, pdu))) => {
                    trace!(
                        tid = header.transaction_id,
                        unit = header.unit_id,
                        pdu = %hex::encode(&pdu),
                        "Framed request"
                    );
                    match self.decoder.decode(&pdu) {
                        Ok(pdu) => {
                            on_request(Request::new(header.transaction_id, header.unit_id, pdu))
                        }
                        Err(e) => {
                            debug!(
                                tid = header.transaction_id,
                                error = %e,
                                "Dropping undecodable frame"
                            )
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        error = %e,
                        discarded = self.buffer.len(),
                        "Stream out of sync, discarding buffer"
                    );
                    self.buffer.clear();
                    break;
                }
            }
        }

        if self.buffer.len() > MAX_BUFFER_SIZE {
            let error = FrameError::BufferOverflow {
                size: self.buffer.len(),
                max: MAX_BUFFER_SIZE,
            };
            warn!(error = %error, "Discarding buffer");
            self.buffer.clear();
        }
    }

    fn build_packet(&self, response: &Response) -> Bytes {
        let pdu = response.pdu.encode();
        let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
        buf.put_u16(response.transaction_id);
        buf.put_u16(0);
        buf.put_u16((pdu.len() + 1) as u16);
        buf.put_u8(response.unit_id);
        buf.put_slice(&pdu);
        buf.freeze()
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Frames a request the way a client sends it.
pub fn encode_request(request: &Request) -> Bytes {
    let pdu = request.pdu.encode();
    let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
    buf.put_u16(request.transaction_id);
    buf.put_u16(0);
    buf.put_u16((pdu.len() + 1) as u16);
    buf.put_u8(request.unit_id);
    buf.put_slice(&pdu);
    buf.freeze()
}
