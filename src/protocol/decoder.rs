//! Server-Side PDU Decoder
//!
//! Turns a function-code-tagged PDU into a typed [`RequestPdu`].
//! The decoder is stateless and shared by every framer on the server.
//!
//! The decoder returns either:
//! - `Ok(pdu)` - The PDU is structurally valid
//! - `Err(DecodeError)` - The PDU is empty, truncated or internally inconsistent
//!
//! An unknown function code is not an error: it decodes to
//! [`RequestPdu::Unsupported`] so that the server can answer it with
//! `IllegalFunction`. Values that are well formed but out of range (a count
//! of zero, a coil value other than `0xFF00`/`0x0000`) also decode
//! successfully and are rejected at execution time.

use crate::protocol::types::{function, unpack_bits, RequestPdu, MAX_PDU_SIZE};
use thiserror::Error;

/// Errors that can occur while decoding a request PDU.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The PDU has no function code
    #[error("empty PDU")]
    Empty,

    /// The PDU length does not match what the function code requires
    #[error("invalid length for function {function_code:#04x}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        function_code: u8,
        expected: usize,
        actual: usize,
    },

    /// The byte count field disagrees with the quantity field
    #[error("byte count {byte_count} does not match quantity {quantity} for function {function_code:#04x}")]
    ByteCountMismatch {
        function_code: u8,
        byte_count: usize,
        quantity: usize,
    },

    /// The PDU exceeds the maximum Modbus PDU size
    #[error("PDU too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Decodes request PDUs received by the server.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerDecoder;

impl ServerDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a complete request PDU.
    ///
    /// # Arguments
    ///
    /// * `pdu` - The function code followed by the request data
    pub fn decode(&self, pdu: &[u8]) -> DecodeResult<RequestPdu> {
        let (&function_code, data) = pdu.split_first().ok_or(DecodeError::Empty)?;

        if pdu.len() > MAX_PDU_SIZE {
            return Err(DecodeError::TooLarge {
                size: pdu.len(),
                max: MAX_PDU_SIZE,
            });
        }

        match function_code {
            function::READ_COILS => {
                let (address, count) = address_and_value(function_code, data)?;
                Ok(RequestPdu::ReadCoils { address, count })
            }
            function::READ_DISCRETE_INPUTS => {
                let (address, count) = address_and_value(function_code, data)?;
                Ok(RequestPdu::ReadDiscreteInputs { address, count })
            }
            function::READ_HOLDING_REGISTERS => {
                let (address, count) = address_and_value(function_code, data)?;
                Ok(RequestPdu::ReadHoldingRegisters { address, count })
            }
            function::READ_INPUT_REGISTERS => {
                let (address, count) = address_and_value(function_code, data)?;
                Ok(RequestPdu::ReadInputRegisters { address, count })
            }
            function::WRITE_SINGLE_COIL => {
                let (address, value) = address_and_value(function_code, data)?;
                Ok(RequestPdu::WriteSingleCoil { address, value })
            }
            function::WRITE_SINGLE_REGISTER => {
                let (address, value) = address_and_value(function_code, data)?;
                Ok(RequestPdu::WriteSingleRegister { address, value })
            }
            function::WRITE_MULTIPLE_COILS => self.decode_write_coils(data),
            function::WRITE_MULTIPLE_REGISTERS => self.decode_write_registers(data),
            function::REPORT_SERVER_ID => {
                expect_len(function_code, data, 0)?;
                Ok(RequestPdu::ReportServerId)
            }
            function::READ_WRITE_MULTIPLE_REGISTERS => self.decode_read_write_registers(data),
            function::ENCAPSULATED_INTERFACE => self.decode_device_identification(data),
            _ => Ok(RequestPdu::Unsupported { function_code }),
        }
    }

    /// FC15: address(2) quantity(2) byte_count(1) values(N)
    fn decode_write_coils(&self, data: &[u8]) -> DecodeResult<RequestPdu> {
        let function_code = function::WRITE_MULTIPLE_COILS;
        let (address, quantity, values) = multiple_write_header(function_code, data)?;

        let quantity = quantity as usize;
        if quantity.div_ceil(8) != values.len() {
            return Err(DecodeError::ByteCountMismatch {
                function_code,
                byte_count: values.len(),
                quantity,
            });
        }

        Ok(RequestPdu::WriteMultipleCoils {
            address,
            values: unpack_bits(values, quantity),
        })
    }

    /// FC16: address(2) quantity(2) byte_count(1) values(2N)
    fn decode_write_registers(&self, data: &[u8]) -> DecodeResult<RequestPdu> {
        let function_code = function::WRITE_MULTIPLE_REGISTERS;
        let (address, quantity, values) = multiple_write_header(function_code, data)?;

        let quantity = quantity as usize;
        if quantity * 2 != values.len() {
            return Err(DecodeError::ByteCountMismatch {
                function_code,
                byte_count: values.len(),
                quantity,
            });
        }

        Ok(RequestPdu::WriteMultipleRegisters {
            address,
            values: registers(values),
        })
    }

    /// FC23: read_address(2) read_count(2) write_address(2) write_count(2)
    /// byte_count(1) values(2N)
    fn decode_read_write_registers(&self, data: &[u8]) -> DecodeResult<RequestPdu> {
        let function_code = function::READ_WRITE_MULTIPLE_REGISTERS;
        if data.len() < 9 {
            return Err(DecodeError::InvalidLength {
                function_code,
                expected: 10,
                actual: data.len() + 1,
            });
        }

        let read_address = be_u16(&data[0..2]);
        let read_count = be_u16(&data[2..4]);
        let write_address = be_u16(&data[4..6]);
        let write_count = be_u16(&data[6..8]) as usize;
        let byte_count = data[8] as usize;
        let values = &data[9..];

        expect_len(function_code, values, byte_count).map_err(|_| {
            DecodeError::InvalidLength {
                function_code,
                expected: 10 + byte_count,
                actual: data.len() + 1,
            }
        })?;

        if write_count * 2 != byte_count {
            return Err(DecodeError::ByteCountMismatch {
                function_code,
                byte_count,
                quantity: write_count,
            });
        }

        Ok(RequestPdu::ReadWriteMultipleRegisters {
            read_address,
            read_count,
            write_address,
            values: registers(values),
        })
    }

    /// FC43: mei_type(1) read_code(1) object_id(1)
    ///
    /// Other MEI types carry their own layouts and are left to execution,
    /// which answers them with `IllegalFunction`.
    fn decode_device_identification(&self, data: &[u8]) -> DecodeResult<RequestPdu> {
        let function_code = function::ENCAPSULATED_INTERFACE;
        match data.first() {
            None => expect_len(function_code, data, 3)?,
            Some(&function::MEI_READ_DEVICE_ID) => expect_len(function_code, data, 3)?,
            Some(_) => return Ok(RequestPdu::Unsupported { function_code }),
        }

        Ok(RequestPdu::ReadDeviceIdentification {
            read_code: data[1],
            object_id: data[2],
        })
    }
}

/// Checks that `data` (the PDU without its function code) is exactly `len` bytes.
fn expect_len(function_code: u8, data: &[u8], len: usize) -> DecodeResult<()> {
    if data.len() != len {
        return Err(DecodeError::InvalidLength {
            function_code,
            expected: len + 1,
            actual: data.len() + 1,
        });
    }
    Ok(())
}

/// Decodes the common `address(2) value(2)` body of FC01-FC06.
fn address_and_value(function_code: u8, data: &[u8]) -> DecodeResult<(u16, u16)> {
    expect_len(function_code, data, 4)?;
    Ok((be_u16(&data[0..2]), be_u16(&data[2..4])))
}

/// Decodes `address(2) quantity(2) byte_count(1)` and returns the value bytes.
fn multiple_write_header(function_code: u8, data: &[u8]) -> DecodeResult<(u16, u16, &[u8])> {
    if data.len() < 5 {
        return Err(DecodeError::InvalidLength {
            function_code,
            expected: 6,
            actual: data.len() + 1,
        });
    }

    let address = be_u16(&data[0..2]);
    let quantity = be_u16(&data[2..4]);
    let byte_count = data[4] as usize;
    let values = &data[5..];

    if values.len() != byte_count {
        return Err(DecodeError::InvalidLength {
            function_code,
            expected: 6 + byte_count,
            actual: data.len() + 1,
        });
    }

    Ok((address, quantity, values))
}

#[inline]
fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn registers(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(be_u16).collect()
}
