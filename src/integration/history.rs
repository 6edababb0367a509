//! Fixed-length ring of past values.

use std::ops::Index;

use crate::error::{NodalError, Result};

/// Current value plus a fixed number of past values.
///
/// Index 0 is the current point, index 1 the previous accepted point and so
/// on. [`cycle`](Self::cycle) and [`store`](Self::store) rotate the ring in
/// place; the oldest slot becomes the new current slot, so stored buffers are
/// reused rather than reallocated.
#[derive(Debug, Clone, PartialEq)]
pub struct History<T> {
    slots: Vec<T>,
    head: usize,
}

impl<T: Clone> History<T> {
    /// Create a history of `len` points, all set to `value`.
    pub fn new(len: usize, value: T) -> Result<Self> {
        if len == 0 {
            return Err(NodalError::invalid_argument("history length must be positive"));
        }
        Ok(Self {
            slots: vec![value; len],
            head: 0,
        })
    }

    /// Create a history of at least one point without validation.
    pub(crate) fn filled(len: usize, value: T) -> Self {
        Self {
            slots: vec![value; len.max(1)],
            head: 0,
        }
    }

    /// Reset every point to `value`.
    pub fn clear(&mut self, value: T) {
        for slot in &mut self.slots {
            *slot = value.clone();
        }
        self.head = 0;
    }

    /// Store a new current value, shifting all others one point back.
    pub fn store(&mut self, value: T) {
        self.cycle();
        *self.current_mut() = value;
    }
}

impl<T> History<T> {
    /// Number of points, including the current one.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, index: usize) -> usize {
        (self.head + index) % self.slots.len()
    }

    pub fn current(&self) -> &T {
        &self.slots[self.head]
    }

    pub fn current_mut(&mut self) -> &mut T {
        let head = self.head;
        &mut self.slots[head]
    }

    /// Value `index` points back.
    pub fn get(&self, index: usize) -> Result<&T> {
        if index >= self.slots.len() {
            return Err(NodalError::out_of_range(index, self.slots.len()));
        }
        Ok(&self.slots[self.slot(index)])
    }

    /// Mutable value `index` points back.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        if index >= self.slots.len() {
            return Err(NodalError::out_of_range(index, self.slots.len()));
        }
        let slot = self.slot(index);
        Ok(&mut self.slots[slot])
    }

    /// Rotate: every value moves one point back and the oldest value
    /// becomes the current one.
    pub fn cycle(&mut self) {
        let len = self.slots.len();
        self.head = (self.head + len - 1) % len;
    }

    /// Iterate from the current point backwards.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.slots.len()).map(move |i| &self.slots[self.slot(i)])
    }
}

impl<T> Index<usize> for History<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.slots[self.slot(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(len: usize) -> History<usize> {
        let mut h = History::new(len, 0).unwrap();
        for v in (0..len).rev() {
            h.store(v);
        }
        h
    }

    #[test]
    fn test_store_then_read_current() {
        let mut h = History::new(3, 0.0).unwrap();
        h.store(4.5);
        assert_eq!(h[0], 4.5);
        assert_eq!(*h.get(0).unwrap(), 4.5);
        assert_eq!(*h.current(), 4.5);
        h.store(7.0);
        assert_eq!(h[1], 4.5);
    }

    #[test]
    fn test_cycle_len_times_restores_order() {
        for len in 1..6 {
            let mut h = numbered(len);
            let before: Vec<usize> = h.iter().copied().collect();
            assert_eq!(before, (0..len).collect::<Vec<_>>());
            h.cycle();
            if len > 1 {
                assert_eq!(h[0], len - 1);
                assert_eq!(h[1], 0);
            }
            for _ in 1..len {
                h.cycle();
            }
            let after: Vec<usize> = h.iter().copied().collect();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_out_of_range_access() {
        let h = numbered(3);
        assert_eq!(h.get(3), Err(NodalError::out_of_range(3, 3)));
        assert!(History::new(0, 1.0).is_err());
    }

    #[test]
    fn test_clear() {
        let mut h = numbered(4);
        h.clear(9);
        assert!(h.iter().all(|&v| v == 9));
    }
}
