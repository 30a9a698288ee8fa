//! Datastore Module
//!
//! This module provides the register space requests execute against.
//! A [`StoreContext`] maps unit ids to [`UnitStore`]s; each unit store holds
//! the four Modbus tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StoreContext                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐           │
//! │  │  Unit 1     │ │  Unit 2     │ │  Unit N     │           │
//! │  │ coils       │ │ coils       │ │ ...         │           │
//! │  │ discretes   │ │ discretes   │ │             │           │
//! │  │ holding     │ │ holding     │ │             │           │
//! │  │ input       │ │ input       │ │             │           │
//! │  │ (RwLock     │ │ (RwLock     │ │             │           │
//! │  │  per table) │ │  per table) │ │             │           │
//! │  └─────────────┘ └─────────────┘ └─────────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashbus::datastore::{DataBlock, MemoryUnit, RegisterTable, StoreContext};
//!
//! let context = StoreContext::new().with_unit(
//!     1,
//!     MemoryUnit::builder()
//!         .holding_registers(DataBlock::sequential(0, vec![10, 20]))
//!         .build(),
//! );
//!
//! let unit = context.get(1).unwrap();
//! let values = unit.read_registers(RegisterTable::HoldingRegisters, 0, 2).unwrap();
//! assert_eq!(values, vec![10, 20]);
//! assert!(context.get(2).is_err());
//! ```

pub mod block;
pub mod context;
pub mod unit;

// Re-export commonly used types
pub use block::DataBlock;
pub use context::StoreContext;
pub use unit::{
    BitTable, MemoryUnit, MemoryUnitBuilder, RegisterTable, StoreError, StoreResult, UnitStats,
    UnitStore,
};
