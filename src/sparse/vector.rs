//! Sparse right-hand-side vector.
//!
//! Entries live in an arena like the matrix elements and are chained in
//! index order. A dense slot table gives O(1) lookup by index, which the
//! solver needs when scattering the vector into its work array.

use std::ops::{Index, IndexMut};

use super::Scalar;
use crate::error::{NodalError, Result};

const NIL: u32 = u32::MAX;

/// Handle to an entry of a [`SparseVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorId(u32);

impl VectorId {
    /// Slot that absorbs stamps addressed to the ground index.
    pub const TRASH: VectorId = VectorId(0);

    pub fn is_trash(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    index: usize,
    value: T,
    next: u32,
}

/// Sparse vector with 1-based indices.
#[derive(Debug, Clone)]
pub struct SparseVector<T> {
    entries: Vec<Entry<T>>,
    slots: Vec<u32>,
    head: u32,
    len: usize,
}

impl<T: Scalar> Default for SparseVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> SparseVector<T> {
    pub fn new() -> Self {
        Self::with_len(0)
    }

    pub fn with_len(len: usize) -> Self {
        Self {
            entries: vec![Entry {
                index: 0,
                value: T::zero(),
                next: NIL,
            }],
            slots: vec![NIL; len + 1],
            head: NIL,
            len,
        }
    }

    /// Highest addressable index.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of structural entries, excluding the trash slot.
    pub fn entry_count(&self) -> usize {
        self.entries.len() - 1
    }

    /// Grow the vector to at least `len` entries.
    pub fn expand(&mut self, len: usize) {
        if len > self.len {
            self.slots.resize(len + 1, NIL);
            self.len = len;
        }
    }

    /// Get the entry at `index`, creating it if it does not exist.
    pub fn get_element(&mut self, index: usize) -> VectorId {
        if index == 0 {
            return VectorId::TRASH;
        }
        self.expand(index);
        if self.slots[index] != NIL {
            return VectorId(self.slots[index]);
        }
        let id = self.entries.len() as u32;
        self.entries.push(Entry {
            index,
            value: T::zero(),
            next: NIL,
        });
        self.slots[index] = id;
        self.link(id);
        VectorId(id)
    }

    /// Find the entry at `index` without creating it.
    pub fn find_element(&self, index: usize) -> Option<VectorId> {
        if index == 0 {
            return None;
        }
        self.slots
            .get(index)
            .filter(|&&slot| slot != NIL)
            .map(|&slot| VectorId(slot))
    }

    /// Value at `index`, zero when no entry exists.
    pub fn value_at(&self, index: usize) -> T {
        self.find_element(index)
            .map_or_else(T::zero, |id| self.entries[id.0 as usize].value)
    }

    /// Index of an entry.
    pub fn index_of(&self, id: VectorId) -> usize {
        self.entries[id.0 as usize].index
    }

    /// Iterate `(index, value)` pairs in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let entry = &self.entries[cursor as usize];
            cursor = entry.next;
            Some((entry.index, entry.value))
        })
    }

    /// Zero every value while keeping the structure.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.value = T::zero();
        }
    }

    /// Exchange the entries at `a` and `b`.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            if index == 0 || index > self.len {
                return Err(NodalError::out_of_range(index, self.len));
            }
        }
        if a == b {
            return Ok(());
        }
        let (ea, eb) = (self.slots[a], self.slots[b]);
        for id in [ea, eb] {
            if id != NIL {
                self.unlink(id);
            }
        }
        if ea != NIL {
            self.entries[ea as usize].index = b;
        }
        if eb != NIL {
            self.entries[eb as usize].index = a;
        }
        self.slots.swap(a, b);
        for id in [ea, eb] {
            if id != NIL {
                self.link(id);
            }
        }
        Ok(())
    }

    fn link(&mut self, id: u32) {
        let index = self.entries[id as usize].index;
        let mut prev = NIL;
        let mut cursor = self.head;
        while cursor != NIL && self.entries[cursor as usize].index < index {
            prev = cursor;
            cursor = self.entries[cursor as usize].next;
        }
        self.entries[id as usize].next = cursor;
        if prev == NIL {
            self.head = id;
        } else {
            self.entries[prev as usize].next = id;
        }
    }

    fn unlink(&mut self, id: u32) {
        let next = self.entries[id as usize].next;
        if self.head == id {
            self.head = next;
            return;
        }
        let mut cursor = self.head;
        while cursor != NIL {
            let following = self.entries[cursor as usize].next;
            if following == id {
                self.entries[cursor as usize].next = next;
                return;
            }
            cursor = following;
        }
    }
}

impl<T> Index<VectorId> for SparseVector<T> {
    type Output = T;

    fn index(&self, id: VectorId) -> &T {
        &self.entries[id.0 as usize].value
    }
}

impl<T> IndexMut<VectorId> for SparseVector<T> {
    fn index_mut(&mut self, id: VectorId) -> &mut T {
        &mut self.entries[id.0 as usize].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_iterate_sorted() {
        let mut v = SparseVector::<f64>::new();
        for &i in &[5, 2, 9, 1] {
            let id = v.get_element(i);
            v[id] = i as f64;
        }
        let indices: Vec<usize> = v.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2, 5, 9]);
        assert_eq!(v.len(), 9);
        assert_eq!(v.value_at(3), 0.0);
        assert_eq!(v.value_at(5), 5.0);
    }

    #[test]
    fn test_ground_is_trash() {
        let mut v = SparseVector::<f64>::new();
        let id = v.get_element(0);
        assert!(id.is_trash());
        v[id] += 3.0;
        assert_eq!(v.entry_count(), 0);
        assert!(v.iter().next().is_none());
    }

    #[test]
    fn test_swap_moves_values_and_handles() {
        let mut v = SparseVector::<f64>::with_len(4);
        let a = v.get_element(1);
        v[a] = 10.0;
        let b = v.get_element(4);
        v[b] = 40.0;

        v.swap(1, 3).unwrap();
        assert_eq!(v.value_at(3), 10.0);
        assert_eq!(v.value_at(1), 0.0);
        assert_eq!(v.index_of(a), 3);

        v.swap(3, 4).unwrap();
        let pairs: Vec<(usize, f64)> = v.iter().collect();
        assert_eq!(pairs, vec![(3, 40.0), (4, 10.0)]);

        assert!(v.swap(0, 1).is_err());
        assert!(v.swap(2, 5).is_err());
    }
}
