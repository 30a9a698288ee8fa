//! Unit Stores
//!
//! A unit store is the register space of one logical device (one Modbus
//! unit id). It exposes the four standard tables:
//!
//! ```text
//! ┌───────────────────┬──────────┬─────────────┐
//! │ Table             │ Type     │ Access      │
//! ├───────────────────┼──────────┼─────────────┤
//! │ Coils             │ bit      │ read/write  │
//! │ Discrete inputs   │ bit      │ read        │
//! │ Holding registers │ u16      │ read/write  │
//! │ Input registers   │ u16      │ read        │
//! └───────────────────┴──────────┴─────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! Every table of [`MemoryUnit`] sits behind its own `RwLock`, so readers of
//! different tables or different units never wait on each other. A lock is
//! held only for the copy in or out of the table and never across an await
//! point.

use crate::datastore::block::DataBlock;
use crate::protocol::ExceptionCode;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// The two bit tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitTable {
    Coils,
    DiscreteInputs,
}

/// The two register tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterTable {
    HoldingRegisters,
    InputRegisters,
}

impl fmt::Display for BitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitTable::Coils => write!(f, "coils"),
            BitTable::DiscreteInputs => write!(f, "discrete inputs"),
        }
    }
}

impl fmt::Display for RegisterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterTable::HoldingRegisters => write!(f, "holding registers"),
            RegisterTable::InputRegisters => write!(f, "input registers"),
        }
    }
}

/// Errors raised by the datastore while executing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No unit store is registered for this unit id
    #[error("unit {0} not found")]
    UnitNotFound(u8),

    /// An access reached the store with an address range it does not hold
    #[error("{table}: address range {address}+{count} out of bounds")]
    OutOfRange {
        table: String,
        address: u16,
        count: usize,
    },

    /// A table lock was poisoned by a panicking writer
    #[error("{0}: lock poisoned")]
    Poisoned(String),

    /// Any other failure of a custom store implementation
    #[error("store fault: {0}")]
    Fault(String),
}

impl StoreError {
    /// Maps a store failure to the exception code sent to the client.
    ///
    /// Every cause maps to `ServerDeviceFailure`: the client can not act on
    /// the distinction, and address errors the client *can* fix are caught
    /// by request validation before the store is touched.
    pub fn exception_code(&self) -> ExceptionCode {
        match self {
            StoreError::UnitNotFound(_) => ExceptionCode::ServerDeviceFailure,
            StoreError::OutOfRange { .. } => ExceptionCode::ServerDeviceFailure,
            StoreError::Poisoned(_) => ExceptionCode::ServerDeviceFailure,
            StoreError::Fault(_) => ExceptionCode::ServerDeviceFailure,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The capability a request executes against: the register space of one unit.
///
/// Implementations must be cheap and non-blocking; the connection loop calls
/// them inline.
pub trait UnitStore: Send + Sync {
    /// Returns true if `address..address + count` exists in the bit table.
    fn validate_bits(&self, table: BitTable, address: u16, count: u16) -> StoreResult<bool>;

    /// Returns true if `address..address + count` exists in the register table.
    fn validate_registers(
        &self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> StoreResult<bool>;

    fn read_bits(&self, table: BitTable, address: u16, count: u16) -> StoreResult<Vec<bool>>;

    fn write_bits(&self, table: BitTable, address: u16, values: &[bool]) -> StoreResult<()>;

    fn read_registers(
        &self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> StoreResult<Vec<u16>>;

    fn write_registers(
        &self,
        table: RegisterTable,
        address: u16,
        values: &[u16],
    ) -> StoreResult<()>;
}

/// Access statistics for a memory unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStats {
    pub reads: u64,
    pub writes: u64,
}

/// An in-memory unit store.
///
/// # Example
///
/// ```
/// use flashbus::datastore::{DataBlock, MemoryUnit, RegisterTable, UnitStore};
///
/// let unit = MemoryUnit::builder()
///     .holding_registers(DataBlock::sequential(0, vec![10, 20]))
///     .build();
///
/// let values = unit.read_registers(RegisterTable::HoldingRegisters, 0, 2).unwrap();
/// assert_eq!(values, vec![10, 20]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryUnit {
    coils: RwLock<DataBlock<bool>>,
    discrete_inputs: RwLock<DataBlock<bool>>,
    holding_registers: RwLock<DataBlock<u16>>,
    input_registers: RwLock<DataBlock<u16>>,

    /// Statistics: total table reads
    read_count: AtomicU64,

    /// Statistics: total table writes
    write_count: AtomicU64,
}

impl MemoryUnit {
    /// Creates a unit with `size` zeroed entries in each table, starting at address 0.
    pub fn with_size(size: usize) -> Self {
        Self::builder()
            .coils(DataBlock::zeroed(size))
            .discrete_inputs(DataBlock::zeroed(size))
            .holding_registers(DataBlock::zeroed(size))
            .input_registers(DataBlock::zeroed(size))
            .build()
    }

    pub fn builder() -> MemoryUnitBuilder {
        MemoryUnitBuilder::default()
    }

    /// Returns access statistics.
    pub fn stats(&self) -> UnitStats {
        UnitStats {
            reads: self.read_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
        }
    }

    fn bit_block(&self, table: BitTable) -> &RwLock<DataBlock<bool>> {
        match table {
            BitTable::Coils => &self.coils,
            BitTable::DiscreteInputs => &self.discrete_inputs,
        }
    }

    fn register_block(&self, table: RegisterTable) -> &RwLock<DataBlock<u16>> {
        match table {
            RegisterTable::HoldingRegisters => &self.holding_registers,
            RegisterTable::InputRegisters => &self.input_registers,
        }
    }
}

impl UnitStore for MemoryUnit {
    fn validate_bits(&self, table: BitTable, address: u16, count: u16) -> StoreResult<bool> {
        let block = self
            .bit_block(table)
            .read()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        Ok(block.validate(address, count))
    }

    fn validate_registers(
        &self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> StoreResult<bool> {
        let block = self
            .register_block(table)
            .read()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        Ok(block.validate(address, count))
    }

    fn read_bits(&self, table: BitTable, address: u16, count: u16) -> StoreResult<Vec<bool>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let block = self
            .bit_block(table)
            .read()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        block.get(address, count).ok_or(StoreError::OutOfRange {
            table: table.to_string(),
            address,
            count: count as usize,
        })
    }

    fn write_bits(&self, table: BitTable, address: u16, values: &[bool]) -> StoreResult<()> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let mut block = self
            .bit_block(table)
            .write()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        if !block.set(address, values) {
            return Err(StoreError::OutOfRange {
                table: table.to_string(),
                address,
                count: values.len(),
            });
        }
        Ok(())
    }

    fn read_registers(
        &self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> StoreResult<Vec<u16>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let block = self
            .register_block(table)
            .read()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        block.get(address, count).ok_or(StoreError::OutOfRange {
            table: table.to_string(),
            address,
            count: count as usize,
        })
    }

    fn write_registers(
        &self,
        table: RegisterTable,
        address: u16,
        values: &[u16],
    ) -> StoreResult<()> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let mut block = self
            .register_block(table)
            .write()
            .map_err(|_| StoreError::Poisoned(table.to_string()))?;
        if !block.set(address, values) {
            return Err(StoreError::OutOfRange {
                table: table.to_string(),
                address,
                count: values.len(),
            });
        }
        Ok(())
    }
}

/// Builder for [`MemoryUnit`]. Tables not set are empty.
#[derive(Debug, Default)]
pub struct MemoryUnitBuilder {
    coils: DataBlock<bool>,
    discrete_inputs: DataBlock<bool>,
    holding_registers: DataBlock<u16>,
    input_registers: DataBlock<u16>,
}

impl MemoryUnitBuilder {
    pub fn coils(mut self, block: DataBlock<bool>) -> Self {
        self.coils = block;
        self
    }

    pub fn discrete_inputs(mut self, block: DataBlock<bool>) -> Self {
        self.discrete_inputs = block;
        self
    }

    pub fn holding_registers(mut self, block: DataBlock<u16>) -> Self {
        self.holding_registers = block;
        self
    }

    pub fn input_registers(mut self, block: DataBlock<u16>) -> Self {
        self.input_registers = block;
        self
    }

    pub fn build(self) -> MemoryUnit {
        MemoryUnit {
            coils: RwLock::new(self.coils),
            discrete_inputs: RwLock::new(self.discrete_inputs),
            holding_registers: RwLock::new(self.holding_registers),
            input_registers: RwLock::new(self.input_registers),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_read_write_registers() {
        let unit = MemoryUnit::with_size(10);

        unit.write_registers(RegisterTable::HoldingRegisters, 2, &[7, 8])
            .unwrap();
        assert_eq!(
            unit.read_registers(RegisterTable::HoldingRegisters, 1, 3)
                .unwrap(),
            vec![0, 7, 8]
        );
        // Input registers are a separate table
        assert_eq!(
            unit.read_registers(RegisterTable::InputRegisters, 2, 2)
                .unwrap(),
            vec![0, 0]
        );
    }

    #[test]
    fn test_read_write_bits() {
        let unit = MemoryUnit::with_size(16);

        unit.write_bits(BitTable::Coils, 3, &[true, true]).unwrap();
        assert_eq!(
            unit.read_bits(BitTable::Coils, 2, 4).unwrap(),
            vec![false, true, true, false]
        );
    }

    #[test]
    fn test_out_of_range() {
        let unit = MemoryUnit::with_size(4);

        assert!(!unit
            .validate_registers(RegisterTable::HoldingRegisters, 3, 2)
            .unwrap());
        let err = unit
            .read_registers(RegisterTable::HoldingRegisters, 3, 2)
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { address: 3, .. }));
        assert_eq!(err.exception_code(), ExceptionCode::ServerDeviceFailure);
    }

    #[test]
    fn test_stats() {
        let unit = MemoryUnit::with_size(4);

        unit.read_bits(BitTable::DiscreteInputs, 0, 1).unwrap();
        unit.write_bits(BitTable::Coils, 0, &[true]).unwrap();
        unit.read_registers(RegisterTable::InputRegisters, 0, 1)
            .unwrap();

        assert_eq!(unit.stats(), UnitStats { reads: 2, writes: 1 });
    }

    #[test]
    fn test_every_store_error_is_device_failure() {
        let errors = [
            StoreError::UnitNotFound(9),
            StoreError::OutOfRange {
                table: "coils".to_string(),
                address: 0,
                count: 1,
            },
            StoreError::Poisoned("coils".to_string()),
            StoreError::Fault("disk on fire".to_string()),
        ];
        for err in errors {
            assert_eq!(err.exception_code(), ExceptionCode::ServerDeviceFailure);
        }
    }

    #[test]
    fn test_concurrent_access() {
        let unit = Arc::new(MemoryUnit::with_size(100));
        let mut handles = vec![];

        for t in 0..10u16 {
            let unit = Arc::clone(&unit);
            handles.push(thread::spawn(move || {
                for i in 0..100u16 {
                    unit.write_registers(RegisterTable::HoldingRegisters, t * 10, &[t, i])
                        .unwrap();
                    let values = unit
                        .read_registers(RegisterTable::HoldingRegisters, t * 10, 1)
                        .unwrap();
                    assert_eq!(values, vec![t]);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(unit.stats().writes, 1000);
    }
}
