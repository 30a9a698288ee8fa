//! ASCII Framer
//!
//! Line-oriented serial framing. Every byte of `unit PDU lrc` is sent as two
//! uppercase hex digits between a `:` start marker and a CR LF terminator:
//!
//! ```text
//! : F7 03 13 89 00 0A 60 \r\n
//! │ │  └─── PDU ────┘  │   │
//! │ unit             LRC  end
//! start
//! ```
//!
//! Bytes before a start marker are line noise and are discarded. A frame
//! with bad hex or a bad LRC is dropped as a whole.

use crate::framer::checksum::lrc;
use crate::framer::{FrameError, Framer, MAX_BUFFER_SIZE};
use crate::protocol::{Request, Response, ServerDecoder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

const START: u8 = b':';
const END: &[u8] = b"\r\n";

/// ASCII framer for serial lines.
#[derive(Debug)]
pub struct AsciiFramer {
    decoder: ServerDecoder,
    buffer: BytesMut,
}

impl AsciiFramer {
    pub fn new(decoder: ServerDecoder) -> Self {
        Self {
            decoder,
            buffer: BytesMut::with_capacity(512),
        }
    }

    /// Splits the hex body of the next complete line off the buffer.
    fn next_line(&mut self) -> Option<Bytes> {
        let Some(start) = self.buffer.iter().position(|&b| b == START) else {
            if !self.buffer.is_empty() {
                trace!(discarded = self.buffer.len(), "No start marker, discarding");
                self.buffer.clear();
            }
            return None;
        };
        self.buffer.advance(start);

        let end = self.buffer.windows(END.len()).position(|w| w == END)?;
        let mut line = self.buffer.split_to(end + END.len());
        line.advance(1);
        line.truncate(end - 1);
        Some(line.freeze())
    }
}

/// Decodes and checks one frame body: returns the unit id and the PDU bytes.
fn parse_line(line: &[u8]) -> Result<(u8, Vec<u8>), FrameError> {
    let mut raw = hex::decode(line).map_err(|_| FrameError::InvalidHex)?;
    if raw.len() < 3 {
        return Err(FrameError::TooShort(raw.len()));
    }

    let received = raw.pop().unwrap_or_default();
    let expected = lrc(&raw);
    if expected != received {
        return Err(FrameError::LrcMismatch { expected, received });
    }

    let unit_id = raw.remove(0);
    Ok((unit_id, raw))
}

impl Framer for AsciiFramer {
    fn process_incoming_packet(&mut self, data: &[u8], on_request: &mut dyn FnMut(Request)) {
        self.buffer.extend_from_slice(data);

        while let Some(line) = self.next_line() {
            let (unit_id, pdu) = match parse_line(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "Dropping bad frame");
                    continue;
                }
            };
            trace!(unit = unit_id, pdu = %hex::encode(&pdu), "Framed request");

            match self.decoder.decode(&pdu) {
                Ok(pdu) => on_request(Request::new(0, unit_id, pdu)),
                Err(e) => debug!(unit = unit_id, error = %e, "Dropping undecodable frame"),
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
        let mut raw = BytesMut::with_capacity(16);
        raw.put_u8(response.unit_id);
        response.pdu.encode_into(&mut raw);
        frame(&raw)
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Wraps `unit PDU` with the LRC, hex encoding and delimiters.
fn frame(raw: &[u8]) -> Bytes {
    let mut body = raw.to_vec();
    body.push(lrc(raw));

    let encoded = hex::encode_upper(&body);
    let mut buf = BytesMut::with_capacity(encoded.len() + 3);
    buf.put_u8(START);
    buf.put_slice(encoded.as_bytes());
    buf.put_slice(END);
    buf.freeze()
}

/// Frames a request the way a client sends it.
pub fn encode_request(request: &Request) -> Bytes {
    let mut raw = BytesMut::with_capacity(16);
    raw.put_u8(request.unit_id);
    request.pdu.encode_into(&mut raw);
    frame(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ExceptionCode, RequestPdu, ResponsePdu};

    fn collect(framer: &mut AsciiFramer, data: &[u8]) -> Vec<Request> {
        let mut requests = Vec::new();
        framer.process_incoming_packet(data, &mut |r| requests.push(r));
        requests
    }

    const READ_LINE: &[u8] = b":F7031389000A60\r\n";

    fn read_request() -> Request {
        Request::new(
            0,
            0xF7,
            RequestPdu::ReadHoldingRegisters {
                address: 0x1389,
                count: 10,
            },
        )
    }

    #[test]
    fn test_known_line() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        assert_eq!(collect(&mut framer, READ_LINE), vec![read_request()]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_encode_request_matches_wire() {
        assert_eq!(&encode_request(&read_request())[..], READ_LINE);
    }

    #[test]
    fn test_other_mei_type_is_framed() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        assert_eq!(
            collect(&mut framer, b":012B0D0001C6\r\n"),
            vec![Request::new(
                0,
                1,
                RequestPdu::Unsupported { function_code: 0x2B }
            )]
        );
    }

    #[test]
    fn test_noise_before_start_is_discarded() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        let mut data = b"zz\r\n".to_vec();
        data.extend_from_slice(READ_LINE);

        assert_eq!(collect(&mut framer, &data).len(), 1);
    }

    #[test]
    fn test_partial_line_waits() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        assert!(collect(&mut framer, &READ_LINE[..10]).is_empty());
        assert_eq!(framer.buffered(), 10);
        assert_eq!(collect(&mut framer, &READ_LINE[10..]).len(), 1);
    }

    #[test]
    fn test_bad_lrc_is_dropped() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        let mut data = b":F7031389000A61\r\n".to_vec();
        data.extend_from_slice(READ_LINE);

        assert_eq!(collect(&mut framer, &data), vec![read_request()]);
    }

    #[test]
    fn test_bad_hex_is_dropped() {
        let mut framer = AsciiFramer::new(ServerDecoder::new());
        assert!(collect(&mut framer, b":F70G\r\n").is_empty());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_parse_line_too_short() {
        assert_eq!(parse_line(b"0101"), Err(FrameError::TooShort(2)));
    }

    #[test]
    fn test_build_exception_packet() {
        let framer = AsciiFramer::new(ServerDecoder::new());
        let response = Response {
            transaction_id: 0,
            unit_id: 0x01,
            pdu: ResponsePdu::Exception {
                function_code: 0x03,
                code: ExceptionCode::IllegalDataAddress,
            },
        };

        // 01 + 83 + 02 = 0x86, LRC = 0x7A
        assert_eq!(&framer.build_packet(&response)[..], b":0183027A\r\n");
    }
}
