//! Store Context
//!
//! Maps unit ids to unit stores. The context is built once, wrapped in an
//! `Arc` and shared by every connection for the lifetime of the server; it is
//! never copied.
//!
//! In *single* mode every unit id resolves to the same store. This matches
//! devices that ignore the unit id on TCP.

use crate::datastore::unit::{StoreError, StoreResult, UnitStore};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The datastore context shared by all connections.
#[derive(Clone, Default)]
pub struct StoreContext {
    units: BTreeMap<u8, Arc<dyn UnitStore>>,

    /// When set, every unit id resolves to this store
    single: Option<Arc<dyn UnitStore>>,
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("single", &self.single.is_some())
            .finish()
    }
}

impl StoreContext {
    /// Creates an empty context. Every lookup fails with `UnitNotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context in which every unit id resolves to `store`.
    pub fn single(store: impl UnitStore + 'static) -> Self {
        Self {
            units: BTreeMap::new(),
            single: Some(Arc::new(store)),
        }
    }

    /// Registers `store` under `unit_id`, replacing any previous store.
    pub fn with_unit(mut self, unit_id: u8, store: impl UnitStore + 'static) -> Self {
        self.insert(unit_id, Arc::new(store));
        self
    }

    /// Registers a shared store under `unit_id`.
    pub fn insert(&mut self, unit_id: u8, store: Arc<dyn UnitStore>) {
        self.units.insert(unit_id, store);
    }

    /// Looks up the store for `unit_id`.
    pub fn get(&self, unit_id: u8) -> StoreResult<&dyn UnitStore> {
        if let Some(store) = &self.single {
            return Ok(store.as_ref());
        }
        self.units
            .get(&unit_id)
            .map(|store| store.as_ref())
            .ok_or(StoreError::UnitNotFound(unit_id))
    }

    /// Returns true if `unit_id` resolves to a store.
    pub fn contains(&self, unit_id: u8) -> bool {
        self.single.is_some() || self.units.contains_key(&unit_id)
    }

    /// Returns the explicitly registered unit ids in ascending order.
    pub fn unit_ids(&self) -> Vec<u8> {
        self.units.keys().copied().collect()
    }

    pub fn is_single(&self) -> bool {
        self.single.is_some()
    }

    /// Number of explicitly registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.single.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{DataBlock, MemoryUnit, RegisterTable};

    #[test]
    fn test_empty_context() {
        let context = StoreContext::new();

        assert!(context.is_empty());
        assert!(matches!(context.get(1), Err(StoreError::UnitNotFound(1))));
    }

    #[test]
    fn test_lookup_by_unit() {
        let context = StoreContext::new()
            .with_unit(
                1,
                MemoryUnit::builder()
                    .holding_registers(DataBlock::sequential(0, vec![10, 20]))
                    .build(),
            )
            .with_unit(3, MemoryUnit::with_size(1));

        assert_eq!(context.unit_ids(), vec![1, 3]);
        assert!(context.contains(1));
        assert!(!context.contains(2));
        assert!(matches!(context.get(2), Err(StoreError::UnitNotFound(2))));

        let unit = context.get(1).unwrap();
        assert_eq!(
            unit.read_registers(RegisterTable::HoldingRegisters, 0, 2)
                .unwrap(),
            vec![10, 20]
        );
    }

    #[test]
    fn test_single_mode_answers_every_unit() {
        let context = StoreContext::single(MemoryUnit::with_size(4));

        assert!(context.is_single());
        for unit_id in [0u8, 1, 17, 255] {
            assert!(context.contains(unit_id));
            assert!(context.get(unit_id).is_ok());
        }
    }

    #[test]
    fn test_shared_store_under_two_ids() {
        let shared: Arc<dyn UnitStore> = Arc::new(MemoryUnit::with_size(4));
        let mut context = StoreContext::new();
        context.insert(1, Arc::clone(&shared));
        context.insert(2, shared);

        context
            .get(1)
            .unwrap()
            .write_registers(RegisterTable::HoldingRegisters, 0, &[42])
            .unwrap();
        assert_eq!(
            context
                .get(2)
                .unwrap()
                .read_registers(RegisterTable::HoldingRegisters, 0, 1)
                .unwrap(),
            vec![42]
        );
    }
}
