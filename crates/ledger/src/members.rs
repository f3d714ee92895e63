//! Ordered, duplicate-free membership registry.
//!
//! Removal is swap-and-pop: the last member moves into the vacated slot, so
//! an index is only meaningful until the next removal. Addresses are the
//! stable identity; callers re-resolve indices with [`MemberRegistry::index_of`].

use std::collections::HashSet;

use splitter_core::{Address, DomainError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberRegistry {
    order: Vec<Address>,
    present: HashSet<Address>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// O(1) membership test.
    pub fn contains(&self, address: &Address) -> bool {
        self.present.contains(address)
    }

    /// Current order (insertion order, perturbed by removals).
    pub fn as_slice(&self) -> &[Address] {
        &self.order
    }

    pub fn get(&self, index: usize) -> Option<Address> {
        self.order.get(index).copied()
    }

    pub fn index_of(&self, address: &Address) -> Option<usize> {
        if !self.contains(address) {
            return None;
        }
        self.order.iter().position(|a| a == address)
    }

    /// Resolve the address at `index` or fail with `IndexOutOfRange`.
    pub fn at(&self, index: usize) -> Result<Address, DomainError> {
        self.get(index)
            .ok_or_else(|| DomainError::index_out_of_range(index, self.len()))
    }

    pub fn push(&mut self, address: Address) -> Result<(), DomainError> {
        if !self.present.insert(address) {
            return Err(DomainError::DuplicateMember(address));
        }
        self.order.push(address);
        Ok(())
    }

    /// Swap-and-pop removal. Returns the address that was at `index`.
    pub fn swap_remove(&mut self, index: usize) -> Result<Address, DomainError> {
        if index >= self.order.len() {
            return Err(DomainError::index_out_of_range(index, self.len()));
        }
        let removed = self.order.swap_remove(index);
        self.present.remove(&removed);
        Ok(removed)
    }

    /// Sequence and set hold the same addresses, once each.
    pub fn is_consistent(&self) -> bool {
        self.order.len() == self.present.len()
            && self.order.iter().all(|a| self.present.contains(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn registry_of(ns: &[u64]) -> MemberRegistry {
        let mut reg = MemberRegistry::new();
        for n in ns {
            reg.push(addr(*n)).unwrap();
        }
        reg
    }

    #[test]
    fn removing_middle_relocates_last_member() {
        let mut reg = registry_of(&[1, 2, 3]);

        let removed = reg.swap_remove(1).unwrap();

        assert_eq!(removed, addr(2));
        assert_eq!(reg.as_slice(), &[addr(1), addr(3)]);
        assert!(!reg.contains(&addr(2)));
        assert!(reg.is_consistent());
    }

    #[test]
    fn removing_last_keeps_other_positions() {
        let mut reg = registry_of(&[1, 2, 3]);

        assert_eq!(reg.swap_remove(2).unwrap(), addr(3));
        assert_eq!(reg.get(1), Some(addr(2)));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut reg = registry_of(&[1]);
        assert_eq!(
            reg.swap_remove(1),
            Err(DomainError::IndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut reg = registry_of(&[1]);
        assert_eq!(reg.push(addr(1)), Err(DomainError::DuplicateMember(addr(1))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn index_of_tracks_relocation() {
        let mut reg = registry_of(&[1, 2, 3, 4]);
        assert_eq!(reg.index_of(&addr(4)), Some(3));
        reg.swap_remove(0).unwrap();
        assert_eq!(reg.index_of(&addr(4)), Some(0));
        assert_eq!(reg.index_of(&addr(1)), None);
    }
}
