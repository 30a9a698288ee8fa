//! Data Blocks
//!
//! A data block is one contiguous (or sparse) table of values: coils and
//! discrete inputs hold `bool`s, holding and input registers hold `u16`s.
//!
//! Addresses are the zero-based protocol addresses that appear on the wire,
//! so a request for address 0 reads the first value of a sequential block
//! starting at 0.

use std::collections::BTreeMap;

/// One table of addressable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBlock<T> {
    /// `values[i]` lives at address `start + i`.
    Sequential { start: u16, values: Vec<T> },
    /// Only the listed addresses exist.
    Sparse(BTreeMap<u16, T>),
}

impl<T: Copy + Default> DataBlock<T> {
    /// Creates a sequential block.
    pub fn sequential(start: u16, values: Vec<T>) -> Self {
        DataBlock::Sequential { start, values }
    }

    /// Creates a sequential block of `len` default values starting at 0.
    pub fn zeroed(len: usize) -> Self {
        DataBlock::Sequential {
            start: 0,
            values: vec![T::default(); len],
        }
    }

    /// Creates a sparse block from `(address, value)` pairs.
    pub fn sparse(entries: impl IntoIterator<Item = (u16, T)>) -> Self {
        DataBlock::Sparse(entries.into_iter().collect())
    }

    /// Number of addressable values in the block.
    pub fn len(&self) -> usize {
        match self {
            DataBlock::Sequential { values, .. } => values.len(),
            DataBlock::Sparse(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if every address in `address..address + count` exists.
    pub fn validate(&self, address: u16, count: u16) -> bool {
        if count == 0 {
            return false;
        }
        let end = address as usize + count as usize;
        match self {
            DataBlock::Sequential { start, values } => {
                let start = *start as usize;
                address as usize >= start && end <= start + values.len()
            }
            DataBlock::Sparse(map) => {
                let mut expected = address as usize;
                for (a, _) in map.range(address..).take(count as usize) {
                    if *a as usize != expected {
                        return false;
                    }
                    expected += 1;
                }
                expected == end
            }
        }
    }

    /// Reads `count` values. Returns `None` if any address is missing.
    pub fn get(&self, address: u16, count: u16) -> Option<Vec<T>> {
        if !self.validate(address, count) {
            return None;
        }
        match self {
            DataBlock::Sequential { start, values } => {
                let offset = (address - start) as usize;
                Some(values[offset..offset + count as usize].to_vec())
            }
            DataBlock::Sparse(map) => Some(
                map.range(address..)
                    .take(count as usize)
                    .map(|(_, v)| *v)
                    .collect(),
            ),
        }
    }

    /// Writes `values` starting at `address`. Returns `false`, leaving the
    /// block untouched, if any address is missing.
    pub fn set(&mut self, address: u16, new_values: &[T]) -> bool {
        let Ok(count) = u16::try_from(new_values.len()) else {
            return false;
        };
        if !self.validate(address, count) {
            return false;
        }
        match self {
            DataBlock::Sequential { start, values } => {
                let offset = (address - *start) as usize;
                values[offset..offset + new_values.len()].copy_from_slice(new_values);
            }
            DataBlock::Sparse(map) => {
                for (slot, value) in map.range_mut(address..).zip(new_values) {
                    *slot.1 = *value;
                }
            }
        }
        true
    }
}

impl<T: Copy + Default> Default for DataBlock<T> {
    fn default() -> Self {
        DataBlock::Sequential {
            start: 0,
            values: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_get_set() {
        let mut block = DataBlock::sequential(0, vec![10u16, 20, 30]);

        assert_eq!(block.get(0, 2), Some(vec![10, 20]));
        assert!(block.set(1, &[21, 31]));
        assert_eq!(block.get(0, 3), Some(vec![10, 21, 31]));
    }

    #[test]
    fn test_sequential_with_offset() {
        let block = DataBlock::sequential(100, vec![1u16, 2, 3]);

        assert!(!block.validate(99, 1));
        assert!(block.validate(100, 3));
        assert!(!block.validate(101, 3));
        assert_eq!(block.get(102, 1), Some(vec![3]));
    }

    #[test]
    fn test_zero_count_is_invalid() {
        let block = DataBlock::<u16>::zeroed(10);
        assert!(!block.validate(0, 0));
        assert_eq!(block.get(0, 0), None);
    }

    #[test]
    fn test_out_of_range_write_leaves_block_untouched() {
        let mut block = DataBlock::sequential(0, vec![1u16, 2]);

        assert!(!block.set(1, &[7, 8]));
        assert_eq!(block.get(0, 2), Some(vec![1, 2]));
    }

    #[test]
    fn test_end_of_address_space() {
        let block = DataBlock::<bool>::zeroed(u16::MAX as usize + 1);
        assert!(block.validate(u16::MAX, 1));
        assert!(!block.validate(u16::MAX, 2));
    }

    #[test]
    fn test_sparse_requires_contiguous_addresses() {
        let mut block = DataBlock::sparse([(1u16, 5u16), (2, 6), (4, 8)]);

        assert!(block.validate(1, 2));
        assert!(!block.validate(2, 2));
        assert!(!block.validate(0, 1));
        assert_eq!(block.get(1, 2), Some(vec![5, 6]));

        assert!(block.set(2, &[60]));
        assert_eq!(block.get(2, 1), Some(vec![60]));
        assert!(!block.set(3, &[1]));
    }
}
