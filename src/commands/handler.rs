//! Command Handler Module
//!
//! This module implements the Modbus public functions served by FlashBus.
//! It receives decoded request PDUs and executes them against one unit store.
//!
//! ## Supported Functions
//!
//! ### Bit Access
//! - `0x01 Read Coils`
//! - `0x02 Read Discrete Inputs`
//! - `0x05 Write Single Coil`
//! - `0x0F Write Multiple Coils`
//!
//! ### Register Access
//! - `0x03 Read Holding Registers`
//! - `0x04 Read Input Registers`
//! - `0x06 Write Single Register`
//! - `0x10 Write Multiple Registers`
//! - `0x17 Read/Write Multiple Registers`
//!
//! ### Diagnostics
//! - `0x11 Report Server ID`
//! - `0x2B / 0x0E Read Device Identification`
//!
//! ## Error Model
//!
//! Execution returns `Ok(pdu)` for every outcome the protocol defines,
//! including exception responses for bad quantities (`IllegalDataValue`),
//! bad addresses (`IllegalDataAddress`) and unknown functions
//! (`IllegalFunction`). `Err(StoreError)` means the store itself failed;
//! the connection handler turns that into `ServerDeviceFailure`.

use crate::datastore::{BitTable, RegisterTable, StoreResult, UnitStore};
use crate::device::identity::object;
use crate::device::{ControlBlock, CONFORMITY_LEVEL};
use crate::protocol::types::{
    COIL_OFF, COIL_ON, MAX_PDU_SIZE, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_READ_WRITE_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::protocol::{ExceptionCode, RequestPdu, ResponsePdu};
use std::sync::Arc;

/// Read Device Identification access types.
mod read_code {
    pub const BASIC: u8 = 0x01;
    pub const REGULAR: u8 = 0x02;
    pub const EXTENDED: u8 = 0x03;
    pub const SPECIFIC: u8 = 0x04;
}

/// FC43/14 response bytes ahead of the object list.
const DEVICE_ID_HEADER_LEN: usize = 7;

/// Executes Modbus requests against a unit store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// Device metadata (shared)
    control: Arc<ControlBlock>,
}

impl CommandHandler {
    /// Creates a new command handler reporting the given device metadata.
    pub fn new(control: Arc<ControlBlock>) -> Self {
        Self { control }
    }

    /// Executes a request and returns the response PDU.
    ///
    /// # Arguments
    ///
    /// * `request` - The decoded request PDU
    /// * `store` - The register space of the addressed unit
    pub fn execute(&self, request: &RequestPdu, store: &dyn UnitStore) -> StoreResult<ResponsePdu> {
        match request {
            RequestPdu::ReadCoils { address, count } => {
                self.read_bits(request, store, BitTable::Coils, *address, *count)
            }
            RequestPdu::ReadDiscreteInputs { address, count } => {
                self.read_bits(request, store, BitTable::DiscreteInputs, *address, *count)
            }
            RequestPdu::ReadHoldingRegisters { address, count } => self.read_registers(
                request,
                store,
                RegisterTable::HoldingRegisters,
                *address,
                *count,
            ),
            RequestPdu::ReadInputRegisters { address, count } => self.read_registers(
                request,
                store,
                RegisterTable::InputRegisters,
                *address,
                *count,
            ),
            RequestPdu::WriteSingleCoil { address, value } => {
                self.write_single_coil(request, store, *address, *value)
            }
            RequestPdu::WriteSingleRegister { address, value } => {
                self.write_single_register(request, store, *address, *value)
            }
            RequestPdu::WriteMultipleCoils { address, values } => {
                self.write_multiple_coils(request, store, *address, values)
            }
            RequestPdu::WriteMultipleRegisters { address, values } => {
                self.write_multiple_registers(request, store, *address, values)
            }
            RequestPdu::ReportServerId => Ok(ResponsePdu::ReportServerId {
                server_id: self.control.server_id(),
                running: true,
            }),
            RequestPdu::ReadWriteMultipleRegisters {
                read_address,
                read_count,
                write_address,
                values,
            } => self.read_write_registers(
                request,
                store,
                *read_address,
                *read_count,
                *write_address,
                values,
            ),
            RequestPdu::ReadDeviceIdentification {
                read_code,
                object_id,
            } => Ok(self.read_device_identification(request, *read_code, *object_id)),
            RequestPdu::Unsupported { .. } => {
                Ok(request.exception(ExceptionCode::IllegalFunction))
            }
        }
    }

    // ========================================================================
    // Bit access
    // ========================================================================

    /// FC01 / FC02
    fn read_bits(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        table: BitTable,
        address: u16,
        count: u16,
    ) -> StoreResult<ResponsePdu> {
        if !(1..=MAX_READ_BITS).contains(&count) {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        }
        if !store.validate_bits(table, address, count)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        let values = store.read_bits(table, address, count)?;
        Ok(match table {
            BitTable::Coils => ResponsePdu::ReadCoils { values },
            BitTable::DiscreteInputs => ResponsePdu::ReadDiscreteInputs { values },
        })
    }

    /// FC05
    fn write_single_coil(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        address: u16,
        value: u16,
    ) -> StoreResult<ResponsePdu> {
        let bit = match value {
            COIL_ON => true,
            COIL_OFF => false,
            _ => return Ok(request.exception(ExceptionCode::IllegalDataValue)),
        };
        if !store.validate_bits(BitTable::Coils, address, 1)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        store.write_bits(BitTable::Coils, address, &[bit])?;
        Ok(ResponsePdu::WriteSingleCoil { address, value })
    }

    /// FC15
    fn write_multiple_coils(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        address: u16,
        values: &[bool],
    ) -> StoreResult<ResponsePdu> {
        let Some(count) = quantity(values.len(), MAX_WRITE_COILS) else {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        };
        if !store.validate_bits(BitTable::Coils, address, count)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        store.write_bits(BitTable::Coils, address, values)?;
        Ok(ResponsePdu::WriteMultipleCoils { address, count })
    }

    // ========================================================================
    // Register access
    // ========================================================================

    /// FC03 / FC04
    fn read_registers(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> StoreResult<ResponsePdu> {
        if !(1..=MAX_READ_REGISTERS).contains(&count) {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        }
        if !store.validate_registers(table, address, count)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        let values = store.read_registers(table, address, count)?;
        Ok(match table {
            RegisterTable::HoldingRegisters => ResponsePdu::ReadHoldingRegisters { values },
            RegisterTable::InputRegisters => ResponsePdu::ReadInputRegisters { values },
        })
    }

    /// FC06
    fn write_single_register(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        address: u16,
        value: u16,
    ) -> StoreResult<ResponsePdu> {
        if !store.validate_registers(RegisterTable::HoldingRegisters, address, 1)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        store.write_registers(RegisterTable::HoldingRegisters, address, &[value])?;
        Ok(ResponsePdu::WriteSingleRegister { address, value })
    }

    /// FC16
    fn write_multiple_registers(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        address: u16,
        values: &[u16],
    ) -> StoreResult<ResponsePdu> {
        let Some(count) = quantity(values.len(), MAX_WRITE_REGISTERS) else {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        };
        if !store.validate_registers(RegisterTable::HoldingRegisters, address, count)? {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        store.write_registers(RegisterTable::HoldingRegisters, address, values)?;
        Ok(ResponsePdu::WriteMultipleRegisters { address, count })
    }

    /// FC23. The write happens before the read.
    fn read_write_registers(
        &self,
        request: &RequestPdu,
        store: &dyn UnitStore,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        values: &[u16],
    ) -> StoreResult<ResponsePdu> {
        let table = RegisterTable::HoldingRegisters;

        let Some(write_count) = quantity(values.len(), MAX_READ_WRITE_REGISTERS) else {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        };
        if !(1..=MAX_READ_REGISTERS).contains(&read_count) {
            return Ok(request.exception(ExceptionCode::IllegalDataValue));
        }
        if !store.validate_registers(table, write_address, write_count)?
            || !store.validate_registers(table, read_address, read_count)?
        {
            return Ok(request.exception(ExceptionCode::IllegalDataAddress));
        }

        store.write_registers(table, write_address, values)?;
        let values = store.read_registers(table, read_address, read_count)?;
        Ok(ResponsePdu::ReadWriteMultipleRegisters { values })
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// FC43 / MEI 14
    ///
    /// Stream access (basic, regular, extended) returns a whole category;
    /// an unknown starting object restarts the stream at object 0. Extended
    /// objects are not defined, so extended access answers with the regular
    /// category. Objects that do not fit in one PDU are left for a follow-up
    /// request starting at `next_object_id`.
    fn read_device_identification(
        &self,
        request: &RequestPdu,
        code: u8,
        object_id: u8,
    ) -> ResponsePdu {
        let identity = self.control.identity();

        let objects = match code {
            read_code::BASIC | read_code::REGULAR | read_code::EXTENDED => {
                let last = if code == read_code::BASIC {
                    object::LAST_BASIC
                } else {
                    object::LAST_REGULAR
                };
                let first = if object_id > last { 0 } else { object_id };
                identity.objects(first, last)
            }
            read_code::SPECIFIC => {
                if identity.object(object_id).is_none() {
                    return request.exception(ExceptionCode::IllegalDataAddress);
                }
                identity.objects(object_id, object_id)
            }
            _ => return request.exception(ExceptionCode::IllegalDataValue),
        };

        let mut size = DEVICE_ID_HEADER_LEN;
        let mut next_object_id = None;
        let mut fitted = Vec::with_capacity(objects.len());
        for (id, value) in objects {
            size += 2 + value.len();
            if size > MAX_PDU_SIZE && !fitted.is_empty() {
                next_object_id = Some(id);
                break;
            }
            fitted.push((id, value));
        }

        ResponsePdu::ReadDeviceIdentification {
            read_code: code,
            conformity_level: CONFORMITY_LEVEL,
            more_follows: next_object_id.is_some(),
            next_object_id: next_object_id.unwrap_or(0),
            objects: fitted,
        }
    }
}

/// Converts a value count into a wire quantity in `1..=max`.
fn quantity(len: usize, max: u16) -> Option<u16> {
    u16::try_from(len)
        .ok()
        .filter(|count| (1..=max).contains(count))
}
