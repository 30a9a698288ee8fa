//! RTU Framer
//!
//! Binary serial framing: `unit(1) PDU crc(2)` with the CRC sent low byte
//! first. RTU frames carry no length field, so the request length is derived
//! from the function code (and the byte count field for variable-length
//! writes) instead of from inter-character silence timing.
//!
//! When a candidate frame fails the CRC check, or its function code has no
//! known request length, the framer drops a single byte and tries again from
//! the next offset. This resynchronizes on the next real frame boundary
//! after line noise.

use crate::framer::checksum::crc16;
use crate::framer::{FrameError, Framer, MAX_BUFFER_SIZE};
use crate::protocol::types::function;
use crate::protocol::{Request, Response, ServerDecoder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

/// Unit id plus CRC.
const OVERHEAD: usize = 3;

/// Returns the full RTU frame length of a request, or `Ok(None)` when more
/// bytes are needed to tell.
pub fn request_length(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    let Some(&function_code) = buf.get(1) else {
        return Ok(None);
    };

    let len = match function_code {
        function::READ_COILS
        | function::READ_DISCRETE_INPUTS
        | function::READ_HOLDING_REGISTERS
        | function::READ_INPUT_REGISTERS
        | function::WRITE_SINGLE_COIL
        | function::WRITE_SINGLE_REGISTER => OVERHEAD + 5,
        function::WRITE_MULTIPLE_COILS | function::WRITE_MULTIPLE_REGISTERS => {
            match buf.get(6) {
                Some(&byte_count) => OVERHEAD + 6 + byte_count as usize,
                None => return Ok(None),
            }
        }
        function::READ_WRITE_MULTIPLE_REGISTERS => match buf.get(10) {
            Some(&byte_count) => OVERHEAD + 10 + byte_count as usize,
            None => return Ok(None),
        },
        function::REPORT_SERVER_ID => OVERHEAD + 1,
        function::ENCAPSULATED_INTERFACE => OVERHEAD + 4,
        other => return Err(FrameError::UnknownFunction(other)),
    };
    Ok(Some(len))
}

/// Checks the trailing CRC of a complete frame.
fn check_crc(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < OVERHEAD + 1 {
        return Err(FrameError::TooShort(frame.len()));
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let expected = crc16(body);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    if expected != received {
        return Err(FrameError::CrcMismatch { expected, received });
    }
    Ok(())
}

/// RTU framer for serial lines.
#[derive(Debug)]
pub struct RtuFramer {
    decoder: ServerDecoder,
    buffer: BytesMut,
}

impl RtuFramer {
    pub fn new(decoder: ServerDecoder) -> Self {
        Self {
            decoder,
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Splits one CRC-checked frame off the buffer.
    fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        let Some(len) = request_length(&self.buffer)? else {
            return Ok(None);
        };
        if self.buffer.len() < len {
            return Ok(None);
        }
        check_crc(&self.buffer[..len])?;
        Ok(Some(self.buffer.split_to(len).freeze()))
    }
}

impl Framer for RtuFramer {
    fn process_incoming_packet(&mut self, data: &[u8], on_request: &mut dyn FnMut(Request)) {
        self.buffer.extend_from_slice(data);

        loop {
            match self.next_frame() {
                Ok(Some(frame)) => {
                    trace!(frame = %hex::encode(&frame), "Framed request");
                    let unit_id = frame[0];
                    let pdu = &frame[1..frame.len() - 2];
                    match self.decoder.decode(pdu) {
                        Ok(pdu) => on_request(Request::new(0, unit_id, pdu)),
                        Err(e) => debug!(unit = unit_id, error = %e, "Dropping undecodable frame"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Resynchronizing, skipping one byte");
                    self.buffer.advance(1);
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
        let mut buf = BytesMut::with_capacity(OVERHEAD + 8);
        buf.put_u8(response.unit_id);
        response.pdu.encode_into(&mut buf);
        let crc = crc16(&buf);
        buf.put_u16_le(crc);
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
    let mut buf = BytesMut::with_capacity(OVERHEAD + 8);
    buf.put_u8(request.unit_id);
    request.pdu.encode_into(&mut buf);
    let crc = crc16(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestPdu, ResponsePdu};

    fn collect(framer: &mut RtuFramer, data: &[u8]) -> Vec<Request> {
        let mut requests = Vec::new();
        framer.process_incoming_packet(data, &mut |r| requests.push(r));
        requests
    }

    // Unit 1, read 1 holding register at 0
    const READ_FRAME: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A];

    #[test]
    fn test_known_frame() {
        let mut framer = RtuFramer::new(ServerDecoder::new());
        let requests = collect(&mut framer, READ_FRAME);

        assert_eq!(
            requests,
            vec![Request::new(
                0,
                1,
                RequestPdu::ReadHoldingRegisters {
                    address: 0,
                    count: 1
                }
            )]
        );
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_encode_request_matches_wire() {
        let request = Request::new(
            0,
            1,
            RequestPdu::ReadHoldingRegisters {
                address: 0,
                count: 1,
            },
        );
        assert_eq!(&encode_request(&request)[..], READ_FRAME);
    }

    #[test]
    fn test_request_length() {
        assert_eq!(request_length(&[0x01]), Ok(None));
        assert_eq!(request_length(&[0x01, 0x03]), Ok(Some(8)));
        assert_eq!(request_length(&[0x01, 0x10, 0, 0, 0, 2]), Ok(None));
        assert_eq!(request_length(&[0x01, 0x10, 0, 0, 0, 2, 4]), Ok(Some(13)));
        assert_eq!(
            request_length(&[0x01, 0x17, 0, 0, 0, 1, 0, 0, 0, 1, 2]),
            Ok(Some(15))
        );
        assert_eq!(request_length(&[0x01, 0x11]), Ok(Some(4)));
        assert_eq!(request_length(&[0x01, 0x2B]), Ok(Some(7)));
        assert_eq!(
            request_length(&[0x01, 0x42]),
            Err(FrameError::UnknownFunction(0x42))
        );
    }

    #[test]
    fn test_split_delivery() {
        let mut framer = RtuFramer::new(ServerDecoder::new());
        assert!(collect(&mut framer, &READ_FRAME[..3]).is_empty());
        assert_eq!(collect(&mut framer, &READ_FRAME[3..]).len(), 1);
    }

    #[test]
    fn test_variable_length_write() {
        let mut framer = RtuFramer::new(ServerDecoder::new());
        let request = Request::new(
            0,
            7,
            RequestPdu::WriteMultipleRegisters {
                address: 4,
                values: vec![0x1234, 0x5678],
            },
        );

        assert_eq!(collect(&mut framer, &encode_request(&request)), vec![request]);
    }

    #[test]
    fn test_bad_crc_resyncs_to_next_frame() {
        let mut framer = RtuFramer::new(ServerDecoder::new());
        let mut corrupt = READ_FRAME.to_vec();
        corrupt[7] ^= 0xFF;

        let mut data = corrupt;
        data.extend_from_slice(READ_FRAME);

        let requests = collect(&mut framer, &data);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].unit_id, 1);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_leading_noise_is_skipped() {
        let mut framer = RtuFramer::new(ServerDecoder::new());
        let mut data = vec![0x00, 0xFF];
        data.extend_from_slice(READ_FRAME);

        assert_eq!(collect(&mut framer, &data).len(), 1);
    }

    #[test]
    fn test_build_packet() {
        let framer = RtuFramer::new(ServerDecoder::new());
        let response = Response {
            transaction_id: 0,
            unit_id: 1,
            pdu: ResponsePdu::ReadHoldingRegisters { values: vec![0x0A] },
        };

        let packet = framer.build_packet(&response);
        assert_eq!(&packet[..5], &[0x01, 0x03, 0x02, 0x00, 0x0A]);
        assert!(check_crc(&packet).is_ok());
    }
}
