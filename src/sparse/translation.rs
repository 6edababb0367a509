//! Bidirectional index maps between external equations and the internal
//! (pivot-ordered) matrix.

use crate::error::{NodalError, Result};

/// Permutation between external and internal indices.
///
/// The map grows as the identity: an index that has never been swapped
/// maps to itself. Index 0 always maps to 0.
#[derive(Debug, Clone)]
pub struct Translation {
    ext_to_int: Vec<usize>,
    int_to_ext: Vec<usize>,
}

impl Default for Translation {
    fn default() -> Self {
        Self::new()
    }
}

impl Translation {
    pub fn new() -> Self {
        Self {
            ext_to_int: vec![0],
            int_to_ext: vec![0],
        }
    }

    /// Number of mapped indices, excluding ground.
    pub fn len(&self) -> usize {
        self.ext_to_int.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend the map so that `size` indices are covered.
    pub fn expand(&mut self, size: usize) {
        for index in self.ext_to_int.len()..=size {
            self.ext_to_int.push(index);
            self.int_to_ext.push(index);
        }
    }

    /// Internal index for an external index, extending the map if needed.
    pub fn to_internal(&mut self, external: usize) -> usize {
        self.expand(external);
        self.ext_to_int[external]
    }

    /// Internal index for an external index without extending the map.
    pub fn internal(&self, external: usize) -> usize {
        self.ext_to_int.get(external).copied().unwrap_or(external)
    }

    /// External index for an internal index.
    pub fn external(&self, internal: usize) -> usize {
        self.int_to_ext.get(internal).copied().unwrap_or(internal)
    }

    /// Record that internal indices `a` and `b` were exchanged.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        let len = self.len();
        for index in [a, b] {
            if index == 0 || index > len {
                return Err(NodalError::out_of_range(index, len));
            }
        }
        let ext_a = self.int_to_ext[a];
        let ext_b = self.int_to_ext[b];
        self.int_to_ext.swap(a, b);
        self.ext_to_int[ext_a] = b;
        self.ext_to_int[ext_b] = a;
        Ok(())
    }
}
