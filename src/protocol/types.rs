//! Modbus Protocol Data Types
//!
//! This module defines the request and response types exchanged between a
//! Modbus client and FlashBus. A Modbus message is a PDU (Protocol Data Unit)
//! wrapped in a transport-specific ADU; the PDU is what this module models.
//!
//! ## PDU Format
//!
//! Every PDU starts with a one byte function code followed by
//! function-specific data. All multi-byte fields are big-endian.
//!
//! ```text
//! ┌───────────────┬──────────────────────────────┐
//! │ function code │ data (0..=252 bytes)         │
//! └───────────────┴──────────────────────────────┘
//! ```
//!
//! An exception response sets the high bit of the function code and carries
//! a single exception code:
//!
//! Read Holding Registers: `03 00 00 00 02`
//! Exception (device failure): `83 04`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Maximum PDU size: RS485 ADU (256) - address (1) - CRC (2).
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum number of registers for a read (FC03/FC04/FC23 read part).
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for a write (FC16).
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of registers written by FC23.
pub const MAX_READ_WRITE_REGISTERS: u16 = 121;

/// Maximum number of bits for a read (FC01/FC02).
pub const MAX_READ_BITS: u16 = 2000;

/// Maximum number of coils for a write (FC15).
pub const MAX_WRITE_COILS: u16 = 1968;

/// Wire value for a coil switched ON by FC05.
pub const COIL_ON: u16 = 0xFF00;

/// Wire value for a coil switched OFF by FC05.
pub const COIL_OFF: u16 = 0x0000;

/// Bit set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Modbus public function codes served by FlashBus.
pub mod function {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
    pub const REPORT_SERVER_ID: u8 = 0x11;
    pub const READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;
    pub const ENCAPSULATED_INTERFACE: u8 = 0x2B;

    /// MEI type carried by FC43 for Read Device Identification.
    pub const MEI_READ_DEVICE_ID: u8 = 0x0E;
}

/// Modbus exception codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    /// The "execution failure" code returned whenever the store cannot
    /// fulfil a request.
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Returns the wire value of this exception code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Maps a wire value back to an exception code.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            _ => return None,
        })
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::ServerDeviceBusy => "server device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => {
                "gateway target device failed to respond"
            }
        };
        write!(f, "{} ({:#04x})", name, self.code())
    }
}

/// A decoded request PDU.
///
/// Quantities and values are kept exactly as they appeared on the wire.
/// Range checks happen at execution time so that they can be answered with
/// the proper exception code instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPdu {
    /// FC01
    ReadCoils { address: u16, count: u16 },
    /// FC02
    ReadDiscreteInputs { address: u16, count: u16 },
    /// FC03
    ReadHoldingRegisters { address: u16, count: u16 },
    /// FC04
    ReadInputRegisters { address: u16, count: u16 },
    /// FC05. `value` is the raw wire value, valid values are [`COIL_ON`] and [`COIL_OFF`].
    WriteSingleCoil { address: u16, value: u16 },
    /// FC06
    WriteSingleRegister { address: u16, value: u16 },
    /// FC15
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    /// FC16
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
    /// FC17
    ReportServerId,
    /// FC23. The write is performed before the read.
    ReadWriteMultipleRegisters {
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: Vec<u16>,
    },
    /// FC43 / MEI 14
    ReadDeviceIdentification { read_code: u8, object_id: u8 },
    /// Any function code FlashBus does not implement.
    Unsupported { function_code: u8 },
}

impl RequestPdu {
    /// Returns the function code of this request.
    pub fn function_code(&self) -> u8 {
        match self {
            RequestPdu::ReadCoils { .. } => function::READ_COILS,
            RequestPdu::ReadDiscreteInputs { .. } => function::READ_DISCRETE_INPUTS,
            RequestPdu::ReadHoldingRegisters { .. } => function::READ_HOLDING_REGISTERS,
            RequestPdu::ReadInputRegisters { .. } => function::READ_INPUT_REGISTERS,
            RequestPdu::WriteSingleCoil { .. } => function::WRITE_SINGLE_COIL,
            RequestPdu::WriteSingleRegister { .. } => function::WRITE_SINGLE_REGISTER,
            RequestPdu::WriteMultipleCoils { .. } => function::WRITE_MULTIPLE_COILS,
            RequestPdu::WriteMultipleRegisters { .. } => function::WRITE_MULTIPLE_REGISTERS,
            RequestPdu::ReportServerId => function::REPORT_SERVER_ID,
            RequestPdu::ReadWriteMultipleRegisters { .. } => {
                function::READ_WRITE_MULTIPLE_REGISTERS
            }
            RequestPdu::ReadDeviceIdentification { .. } => function::ENCAPSULATED_INTERFACE,
            RequestPdu::Unsupported { function_code } => *function_code,
        }
    }

    /// Builds the exception response for this request.
    pub fn exception(&self, code: ExceptionCode) -> ResponsePdu {
        ResponsePdu::Exception {
            function_code: self.function_code(),
            code,
        }
    }

    /// Serializes the request PDU. Used by clients, tests and benchmarks.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the request PDU into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.function_code());
        match self {
            RequestPdu::ReadCoils { address, count }
            | RequestPdu::ReadDiscreteInputs { address, count }
            | RequestPdu::ReadHoldingRegisters { address, count }
            | RequestPdu::ReadInputRegisters { address, count } => {
                buf.put_u16(*address);
                buf.put_u16(*count);
            }
            RequestPdu::WriteSingleCoil { address, value }
            | RequestPdu::WriteSingleRegister { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(*value);
            }
            RequestPdu::WriteMultipleCoils { address, values } => {
                let packed = pack_bits(values);
                buf.put_u16(*address);
                buf.put_u16(values.len() as u16);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            RequestPdu::WriteMultipleRegisters { address, values } => {
                buf.put_u16(*address);
                buf.put_u16(values.len() as u16);
                buf.put_u8((values.len() * 2) as u8);
                put_registers(buf, values);
            }
            RequestPdu::ReportServerId => {}
            RequestPdu::ReadWriteMultipleRegisters {
                read_address,
                read_count,
                write_address,
                values,
            } => {
                buf.put_u16(*read_address);
                buf.put_u16(*read_count);
                buf.put_u16(*write_address);
                buf.put_u16(values.len() as u16);
                buf.put_u8((values.len() * 2) as u8);
                put_registers(buf, values);
            }
            RequestPdu::ReadDeviceIdentification { read_code, object_id } => {
                buf.put_u8(function::MEI_READ_DEVICE_ID);
                buf.put_u8(*read_code);
                buf.put_u8(*object_id);
            }
            RequestPdu::Unsupported { .. } => {}
        }
    }
}

/// A response PDU produced by executing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePdu {
    ReadCoils { values: Vec<bool> },
    ReadDiscreteInputs { values: Vec<bool> },
    ReadHoldingRegisters { values: Vec<u16> },
    ReadInputRegisters { values: Vec<u16> },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, count: u16 },
    WriteMultipleRegisters { address: u16, count: u16 },
    ReportServerId { server_id: Bytes, running: bool },
    ReadWriteMultipleRegisters { values: Vec<u16> },
    ReadDeviceIdentification {
        read_code: u8,
        conformity_level: u8,
        more_follows: bool,
        next_object_id: u8,
        objects: Vec<(u8, Bytes)>,
    },
    /// Exception response: `function_code | 0x80`, `code`.
    Exception { function_code: u8, code: ExceptionCode },
}

impl ResponsePdu {
    /// Returns the function code as it appears on the wire, including the
    /// exception flag for exception responses.
    pub fn function_code(&self) -> u8 {
        match self {
            ResponsePdu::ReadCoils { .. } => function::READ_COILS,
            ResponsePdu::ReadDiscreteInputs { .. } => function::READ_DISCRETE_INPUTS,
            ResponsePdu::ReadHoldingRegisters { .. } => function::READ_HOLDING_REGISTERS,
            ResponsePdu::ReadInputRegisters { .. } => function::READ_INPUT_REGISTERS,
            ResponsePdu::WriteSingleCoil { .. } => function::WRITE_SINGLE_COIL,
            ResponsePdu::WriteSingleRegister { .. } => function::WRITE_SINGLE_REGISTER,
            ResponsePdu::WriteMultipleCoils { .. } => function::WRITE_MULTIPLE_COILS,
            ResponsePdu::WriteMultipleRegisters { .. } => function::WRITE_MULTIPLE_REGISTERS,
            ResponsePdu::ReportServerId { .. } => function::REPORT_SERVER_ID,
            ResponsePdu::ReadWriteMultipleRegisters { .. } => {
                function::READ_WRITE_MULTIPLE_REGISTERS
            }
            ResponsePdu::ReadDeviceIdentification { .. } => function::ENCAPSULATED_INTERFACE,
            ResponsePdu::Exception { function_code, .. } => function_code | EXCEPTION_FLAG,
        }
    }

    /// Returns the exception code if this is an exception response.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            ResponsePdu::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is an exception response.
    pub fn is_exception(&self) -> bool {
        matches!(self, ResponsePdu::Exception { .. })
    }

    /// Serializes the response PDU for sending over the wire.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_PDU_SIZE);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the response PDU into an existing buffer.
    ///
    /// This is more efficient than `encode()` when the framer already holds
    /// a buffer with the ADU header written.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.function_code());
        match self {
            ResponsePdu::ReadCoils { values } | ResponsePdu::ReadDiscreteInputs { values } => {
                let packed = pack_bits(values);
                buf.put_u8(packed.len() as u8);
                buf.put_slice(&packed);
            }
            ResponsePdu::ReadHoldingRegisters { values }
            | ResponsePdu::ReadInputRegisters { values }
            | ResponsePdu::ReadWriteMultipleRegisters { values } => {
                buf.put_u8((values.len() * 2) as u8);
                put_registers(buf, values);
            }
            ResponsePdu::WriteSingleCoil { address, value }
            | ResponsePdu::WriteSingleRegister { address, value } => {
                buf.put_u16(*address);
                buf.put_u16(*value);
            }
            ResponsePdu::WriteMultipleCoils { address, count }
            | ResponsePdu::WriteMultipleRegisters { address, count } => {
                buf.put_u16(*address);
                buf.put_u16(*count);
            }
            ResponsePdu::ReportServerId { server_id, running } => {
                buf.put_u8((server_id.len() + 1) as u8);
                buf.put_slice(server_id);
                buf.put_u8(if *running { 0xFF } else { 0x00 });
            }
            ResponsePdu::ReadDeviceIdentification {
                read_code,
                conformity_level,
                more_follows,
                next_object_id,
                objects,
            } => {
                buf.put_u8(function::MEI_READ_DEVICE_ID);
                buf.put_u8(*read_code);
                buf.put_u8(*conformity_level);
                buf.put_u8(if *more_follows { 0xFF } else { 0x00 });
                buf.put_u8(*next_object_id);
                buf.put_u8(objects.len() as u8);
                for (id, value) in objects {
                    buf.put_u8(*id);
                    buf.put_u8(value.len() as u8);
                    buf.put_slice(value);
                }
            }
            ResponsePdu::Exception { code, .. } => {
                buf.put_u8(code.code());
            }
        }
    }
}

/// A complete request: the PDU plus the correlation fields taken from the ADU.
///
/// Serial framings carry no transaction id; their requests use 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: RequestPdu,
}

impl Request {
    pub fn new(transaction_id: u16, unit_id: u8, pdu: RequestPdu) -> Self {
        Self {
            transaction_id,
            unit_id,
            pdu,
        }
    }
}

/// A complete response, correlated with its request by `transaction_id` and
/// `unit_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: ResponsePdu,
}

impl Response {
    /// Creates a response addressed back to the originator of `request`.
    pub fn reply_to(request: &Request, pdu: ResponsePdu) -> Self {
        Self {
            transaction_id: request.transaction_id,
            unit_id: request.unit_id,
            pdu,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pdu {
            ResponsePdu::Exception {
                function_code,
                code,
            } => write!(
                f,
                "tid={} unit={} fc={:#04x} exception: {}",
                self.transaction_id, self.unit_id, function_code, code
            ),
            pdu => write!(
                f,
                "tid={} unit={} fc={:#04x}",
                self.transaction_id,
                self.unit_id,
                pdu.function_code()
            ),
        }
    }
}

/// Packs bits LSB first, eight per byte.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

/// Unpacks `count` bits from LSB-first packed bytes.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

fn put_registers(buf: &mut BytesMut, values: &[u16]) {
    for value in values {
        buf.put_u16(*value);
    }
}
