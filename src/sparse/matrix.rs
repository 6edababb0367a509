//! Arena-backed sparse matrix with sorted row and column chains.
//!
//! Every nonzero position is a single [`Element`] stored in an arena and
//! addressed by an [`ElementId`]. Each element is linked into exactly one
//! row chain (sorted by column) and one column chain (sorted by row), so
//! traversals never scan unrelated entries. Row and column exchanges relink
//! chain membership and never move elements inside the arena, which keeps
//! every handle handed out to a device valid for the lifetime of the matrix.
//!
//! Indices are 1-based. Index 0 is the ground reference: any request that
//! touches row 0 or column 0 returns [`ElementId::TRASH`], a slot whose
//! value is discarded.

use std::ops::{Index, IndexMut};

use super::Scalar;
use crate::error::{NodalError, Result};

/// End-of-chain marker.
const NIL: u32 = u32::MAX;

/// Chain an element is spliced along: its column chain, ordered by row, or
/// its row chain, ordered by column.
#[derive(Debug, Clone, Copy)]
enum Axis {
    Column,
    Row,
}

/// Handle to an element of a [`SparseMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u32);

impl ElementId {
    /// Slot that absorbs stamps addressed to the ground row or column.
    pub const TRASH: ElementId = ElementId(0);

    /// Whether this is the ground trash slot.
    pub fn is_trash(self) -> bool {
        self.0 == 0
    }

    fn from_link(link: u32) -> Option<Self> {
        (link != NIL).then_some(ElementId(link))
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Element<T> {
    row: usize,
    col: usize,
    value: T,
    next_in_row: u32,
    next_in_col: u32,
}

/// Square sparse matrix with dynamic size.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    elements: Vec<Element<T>>,
    row_heads: Vec<u32>,
    col_heads: Vec<u32>,
    diagonal: Vec<u32>,
    size: usize,
}

impl<T: Scalar> Default for SparseMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> SparseMatrix<T> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self::with_size(0)
    }

    /// Create an empty matrix with room for `size` rows and columns.
    pub fn with_size(size: usize) -> Self {
        let trash = Element {
            row: 0,
            col: 0,
            value: T::zero(),
            next_in_row: NIL,
            next_in_col: NIL,
        };
        Self {
            elements: vec![trash],
            row_heads: vec![NIL; size + 1],
            col_heads: vec![NIL; size + 1],
            diagonal: vec![NIL; size + 1],
            size,
        }
    }

    /// Number of rows (and columns).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of structural elements, excluding the trash slot.
    pub fn element_count(&self) -> usize {
        self.elements.len() - 1
    }

    /// Grow the matrix to at least `size` rows and columns.
    pub fn expand(&mut self, size: usize) {
        if size <= self.size {
            return;
        }
        self.row_heads.resize(size + 1, NIL);
        self.col_heads.resize(size + 1, NIL);
        self.diagonal.resize(size + 1, NIL);
        self.size = size;
    }

    /// Get the element at (`row`, `col`), creating it if it does not exist.
    pub fn get_element(&mut self, row: usize, col: usize) -> ElementId {
        self.get_or_create(row, col).0
    }

    /// Get the element at (`row`, `col`), creating it if needed.
    ///
    /// The flag is `true` when a new structural element was created.
    pub fn get_or_create(&mut self, row: usize, col: usize) -> (ElementId, bool) {
        if row == 0 || col == 0 {
            return (ElementId::TRASH, false);
        }
        self.expand(row.max(col));

        // Locate the insertion point in the column chain
        let mut prev_in_col = NIL;
        let mut cursor = self.col_heads[col];
        while cursor != NIL {
            let element = &self.elements[cursor as usize];
            if element.row == row {
                return (ElementId(cursor), false);
            }
            if element.row > row {
                break;
            }
            prev_in_col = cursor;
            cursor = element.next_in_col;
        }

        let id = self.elements.len() as u32;
        self.elements.push(Element {
            row,
            col,
            value: T::zero(),
            next_in_row: NIL,
            next_in_col: cursor,
        });
        if prev_in_col == NIL {
            self.col_heads[col] = id;
        } else {
            self.elements[prev_in_col as usize].next_in_col = id;
        }
        self.link_in_row(id);
        if row == col {
            self.diagonal[row] = id;
        }
        (ElementId(id), true)
    }

    /// Find the element at (`row`, `col`) without creating it.
    pub fn find_element(&self, row: usize, col: usize) -> Option<ElementId> {
        if row == 0 || col == 0 || row > self.size || col > self.size {
            return None;
        }
        self.column(col)
            .take_while(|&id| self.row_of(id) <= row)
            .find(|&id| self.row_of(id) == row)
    }

    /// Diagonal element of row/column `index`, if structurally present.
    pub fn diagonal(&self, index: usize) -> Option<ElementId> {
        self.diagonal
            .get(index)
            .and_then(|&link| ElementId::from_link(link))
            .filter(|_| index > 0)
    }

    /// First element of row `row`.
    pub fn first_in_row(&self, row: usize) -> Option<ElementId> {
        self.row_heads
            .get(row)
            .and_then(|&link| ElementId::from_link(link))
    }

    /// First element of column `col`.
    pub fn first_in_column(&self, col: usize) -> Option<ElementId> {
        self.col_heads
            .get(col)
            .and_then(|&link| ElementId::from_link(link))
    }

    /// Next element to the right in the same row.
    pub fn right(&self, id: ElementId) -> Option<ElementId> {
        ElementId::from_link(self.elements[id.slot()].next_in_row)
    }

    /// Next element below in the same column.
    pub fn below(&self, id: ElementId) -> Option<ElementId> {
        ElementId::from_link(self.elements[id.slot()].next_in_col)
    }

    /// Row of an element.
    pub fn row_of(&self, id: ElementId) -> usize {
        self.elements[id.slot()].row
    }

    /// Column of an element.
    pub fn col_of(&self, id: ElementId) -> usize {
        self.elements[id.slot()].col
    }

    /// Iterate the elements of a row, left to right.
    pub fn row(&self, row: usize) -> Chain<'_, T> {
        Chain {
            matrix: self,
            next: self.first_in_row(row),
            along_row: true,
        }
    }

    /// Iterate the elements of a column, top to bottom.
    pub fn column(&self, col: usize) -> Chain<'_, T> {
        Chain {
            matrix: self,
            next: self.first_in_column(col),
            along_row: false,
        }
    }

    /// Iterate the elements strictly right of `id` in its row.
    pub fn right_of(&self, id: ElementId) -> Chain<'_, T> {
        Chain {
            matrix: self,
            next: self.right(id),
            along_row: true,
        }
    }

    /// Iterate the elements strictly below `id` in its column.
    pub fn below_of(&self, id: ElementId) -> Chain<'_, T> {
        Chain {
            matrix: self,
            next: self.below(id),
            along_row: false,
        }
    }

    /// Zero every value while keeping the structure.
    pub fn clear(&mut self) {
        for element in &mut self.elements {
            element.value = T::zero();
        }
    }

    /// Exchange rows `a` and `b`.
    ///
    /// Only chain membership is touched; values stay with their elements.
    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        if a == b {
            return Ok(());
        }
        let (low, high) = (a.min(b), a.max(b));
        let mut p = self.row_heads[low];
        let mut q = self.row_heads[high];

        while p != NIL || q != NIL {
            let pc = self.col_or_max(p);
            let qc = self.col_or_max(q);
            if pc < qc {
                let next = self.elements[p as usize].next_in_row;
                self.exchange_in_chain(pc, Axis::Column, p, NIL, low, high);
                p = next;
            } else if qc < pc {
                let next = self.elements[q as usize].next_in_row;
                self.exchange_in_chain(qc, Axis::Column, NIL, q, low, high);
                q = next;
            } else {
                let next_p = self.elements[p as usize].next_in_row;
                let next_q = self.elements[q as usize].next_in_row;
                self.exchange_in_chain(pc, Axis::Column, p, q, low, high);
                p = next_p;
                q = next_q;
            }
        }

        self.row_heads.swap(low, high);
        self.refresh_diagonal(low);
        self.refresh_diagonal(high);
        Ok(())
    }

    /// Exchange columns `a` and `b`.
    pub fn swap_columns(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        if a == b {
            return Ok(());
        }
        let (low, high) = (a.min(b), a.max(b));
        let mut p = self.col_heads[low];
        let mut q = self.col_heads[high];

        while p != NIL || q != NIL {
            let pr = self.row_or_max(p);
            let qr = self.row_or_max(q);
            if pr < qr {
                let next = self.elements[p as usize].next_in_col;
                self.exchange_in_chain(pr, Axis::Row, p, NIL, low, high);
                p = next;
            } else if qr < pr {
                let next = self.elements[q as usize].next_in_col;
                self.exchange_in_chain(qr, Axis::Row, NIL, q, low, high);
                q = next;
            } else {
                let next_p = self.elements[p as usize].next_in_col;
                let next_q = self.elements[q as usize].next_in_col;
                self.exchange_in_chain(pr, Axis::Row, p, q, low, high);
                p = next_p;
                q = next_q;
            }
        }

        self.col_heads.swap(low, high);
        self.refresh_diagonal(low);
        self.refresh_diagonal(high);
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index == 0 || index > self.size {
            return Err(NodalError::out_of_range(index, self.size));
        }
        Ok(())
    }

    fn col_or_max(&self, link: u32) -> usize {
        if link == NIL {
            usize::MAX
        } else {
            self.elements[link as usize].col
        }
    }

    fn row_or_max(&self, link: u32) -> usize {
        if link == NIL {
            usize::MAX
        } else {
            self.elements[link as usize].row
        }
    }

    fn refresh_diagonal(&mut self, index: usize) {
        self.diagonal[index] = self
            .find_element(index, index)
            .map_or(NIL, |id| id.0);
    }

    /// Insert an element into its row chain, sorted by column.
    fn link_in_row(&mut self, id: u32) {
        let (row, col) = {
            let e = &self.elements[id as usize];
            (e.row, e.col)
        };
        let mut prev = NIL;
        let mut cursor = self.row_heads[row];
        while cursor != NIL && self.elements[cursor as usize].col < col {
            prev = cursor;
            cursor = self.elements[cursor as usize].next_in_row;
        }
        self.elements[id as usize].next_in_row = cursor;
        if prev == NIL {
            self.row_heads[row] = id;
        } else {
            self.elements[prev as usize].next_in_row = id;
        }
    }

    fn link(&self, id: u32, axis: Axis) -> u32 {
        let element = &self.elements[id as usize];
        match axis {
            Axis::Column => element.next_in_col,
            Axis::Row => element.next_in_row,
        }
    }

    fn set_link(&mut self, id: u32, axis: Axis, next: u32) {
        let element = &mut self.elements[id as usize];
        match axis {
            Axis::Column => element.next_in_col = next,
            Axis::Row => element.next_in_row = next,
        }
    }

    /// Point `prev` (or the head of `line` when `prev` is NIL) at `next`.
    fn set_link_after(&mut self, prev: u32, line: usize, axis: Axis, next: u32) {
        if prev != NIL {
            self.set_link(prev, axis, next);
            return;
        }
        match axis {
            Axis::Column => self.col_heads[line] = next,
            Axis::Row => self.row_heads[line] = next,
        }
    }

    /// Position of an element along a chain: its row in a column chain.
    fn key(&self, id: u32, axis: Axis) -> usize {
        let element = &self.elements[id as usize];
        match axis {
            Axis::Column => element.row,
            Axis::Row => element.col,
        }
    }

    fn set_key(&mut self, id: u32, axis: Axis, key: usize) {
        let element = &mut self.elements[id as usize];
        match axis {
            Axis::Column => element.row = key,
            Axis::Row => element.col = key,
        }
    }

    /// Exchange positions `low` and `high` within one chain.
    ///
    /// `p` sits at `low` and `q` at `high`; either may be NIL. The chain is
    /// walked once, from its head down to `high`, and the elements are
    /// spliced in place.
    fn exchange_in_chain(&mut self, line: usize, axis: Axis, p: u32, q: u32, low: usize, high: usize) {
        let head = match axis {
            Axis::Column => self.col_heads[line],
            Axis::Row => self.row_heads[line],
        };
        let mut above = NIL;
        let mut cursor = head;
        while cursor != NIL && self.key(cursor, axis) < low {
            above = cursor;
            cursor = self.link(cursor, axis);
        }

        if p != NIL {
            let after_p = self.link(p, axis);
            // Last element strictly between the two positions
            let mut between = NIL;
            let mut cursor = after_p;
            while cursor != NIL && self.key(cursor, axis) < high {
                between = cursor;
                cursor = self.link(cursor, axis);
            }

            if q == NIL {
                if between != NIL {
                    self.set_link_after(above, line, axis, after_p);
                    self.set_link(p, axis, cursor);
                    self.set_link(between, axis, p);
                }
            } else {
                let after_q = self.link(q, axis);
                self.set_link_after(above, line, axis, q);
                if between == NIL {
                    self.set_link(q, axis, p);
                } else {
                    self.set_link(q, axis, after_p);
                    self.set_link(between, axis, p);
                }
                self.set_link(p, axis, after_q);
                self.set_key(q, axis, low);
            }
            self.set_key(p, axis, high);
        } else if q != NIL {
            let first = cursor;
            let mut between = NIL;
            let mut cursor = first;
            while cursor != q {
                between = cursor;
                cursor = self.link(cursor, axis);
            }
            if between != NIL {
                let after_q = self.link(q, axis);
                self.set_link(between, axis, after_q);
                self.set_link_after(above, line, axis, q);
                self.set_link(q, axis, first);
            }
            self.set_key(q, axis, low);
        }
    }
}

impl<T> Index<ElementId> for SparseMatrix<T> {
    type Output = T;

    fn index(&self, id: ElementId) -> &T {
        &self.elements[id.slot()].value
    }
}

impl<T> IndexMut<ElementId> for SparseMatrix<T> {
    fn index_mut(&mut self, id: ElementId) -> &mut T {
        &mut self.elements[id.slot()].value
    }
}

/// Iterator along a row or column chain.
pub struct Chain<'a, T> {
    matrix: &'a SparseMatrix<T>,
    next: Option<ElementId>,
    along_row: bool,
}

impl<T> Iterator for Chain<'_, T> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let current = self.next?;
        let element = &self.matrix.elements[current.slot()];
        let link = if self.along_row {
            element.next_in_row
        } else {
            element.next_in_col
        };
        self.next = ElementId::from_link(link);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(matrix: &SparseMatrix<f64>) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::new();
        for row in 1..=matrix.size() {
            for id in matrix.row(row) {
                out.push((matrix.row_of(id), matrix.col_of(id), matrix[id]));
            }
        }
        out
    }

    fn assert_chains_sorted(matrix: &SparseMatrix<f64>) {
        for i in 1..=matrix.size() {
            let cols: Vec<usize> = matrix.row(i).map(|id| matrix.col_of(id)).collect();
            assert!(cols.windows(2).all(|w| w[0] < w[1]), "row {i} unsorted: {cols:?}");
            assert!(matrix.row(i).all(|id| matrix.row_of(id) == i));
            let rows: Vec<usize> = matrix.column(i).map(|id| matrix.row_of(id)).collect();
            assert!(rows.windows(2).all(|w| w[0] < w[1]), "column {i} unsorted: {rows:?}");
            assert!(matrix.column(i).all(|id| matrix.col_of(id) == i));
        }
    }

    fn sample() -> SparseMatrix<f64> {
        let mut m = SparseMatrix::new();
        for &(r, c, v) in &[
            (1, 1, 1.0),
            (1, 3, 2.0),
            (2, 2, 3.0),
            (3, 1, 4.0),
            (3, 3, 5.0),
            (4, 2, 6.0),
            (4, 4, 7.0),
            (2, 4, 8.0),
        ] {
            let id = m.get_element(r, c);
            m[id] = v;
        }
        m
    }

    #[test]
    fn test_get_element_is_idempotent() {
        let mut m = SparseMatrix::<f64>::new();
        let (a, created) = m.get_or_create(2, 3);
        assert!(created);
        let (b, created) = m.get_or_create(2, 3);
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(m.element_count(), 1);
        assert_eq!(m.size(), 3);
    }

    #[test]
    fn test_ground_maps_to_trash() {
        let mut m = SparseMatrix::<f64>::new();
        assert!(m.get_element(0, 4).is_trash());
        assert!(m.get_element(4, 0).is_trash());
        assert_eq!(m.element_count(), 0);
        assert_eq!(m.size(), 0);
    }

    #[test]
    fn test_insertion_keeps_chains_sorted() {
        let m = sample();
        assert_chains_sorted(&m);
        assert_eq!(m.find_element(3, 1).map(|id| m[id]), Some(4.0));
        assert!(m.find_element(3, 2).is_none());
        assert_eq!(m.diagonal(4).map(|id| m[id]), Some(7.0));
    }

    #[test]
    fn test_swap_rows_twice_restores_mapping() {
        let mut m = sample();
        let before = positions(&m);
        let handle = m.find_element(3, 3).unwrap();

        m.swap_rows(1, 3).unwrap();
        assert_chains_sorted(&m);
        assert_eq!(m.row_of(handle), 1);
        assert_eq!(m.find_element(1, 1).map(|id| m[id]), Some(4.0));
        assert_eq!(m.find_element(3, 3).map(|id| m[id]), Some(2.0));

        m.swap_rows(3, 1).unwrap();
        assert_chains_sorted(&m);
        assert_eq!(positions(&m), before);
        assert_eq!(m.row_of(handle), 3);
    }

    #[test]
    fn test_swap_columns_updates_diagonal() {
        let mut m = sample();
        m.swap_columns(2, 4).unwrap();
        assert_chains_sorted(&m);
        // (4,4)=7 moved to (4,2); (2,4)=8 moved to (2,2)
        assert_eq!(m.diagonal(2).map(|id| m[id]), Some(8.0));
        assert_eq!(m.diagonal(4).map(|id| m[id]), Some(6.0));
        m.swap_columns(2, 4).unwrap();
        assert_eq!(m.diagonal(2).map(|id| m[id]), Some(3.0));
    }

    #[test]
    fn test_swaps_across_gaps_match_dense_model() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let size = 7;
        let mut rng = StdRng::seed_from_u64(11);
        let mut m = SparseMatrix::<f64>::new();
        let mut dense = vec![vec![None; size + 1]; size + 1];
        for row in 1..=size {
            for col in 1..=size {
                if row == col || rng.gen_bool(0.35) {
                    let value = (row * 10 + col) as f64;
                    let id = m.get_element(row, col);
                    m[id] = value;
                    dense[row][col] = Some(value);
                }
            }
        }

        for _ in 0..200 {
            let a = rng.gen_range(1..=size);
            let b = rng.gen_range(1..=size);
            if rng.gen_bool(0.5) {
                m.swap_rows(a, b).unwrap();
                dense.swap(a, b);
            } else {
                m.swap_columns(a, b).unwrap();
                for row in dense.iter_mut() {
                    row.swap(a, b);
                }
            }
            assert_chains_sorted(&m);
            let expected: Vec<(usize, usize, f64)> = (1..=size)
                .flat_map(|row| (1..=size).map(move |col| (row, col)))
                .filter_map(|(row, col)| dense[row][col].map(|v| (row, col, v)))
                .collect();
            assert_eq!(positions(&m), expected);
            for i in 1..=size {
                assert_eq!(m.diagonal(i).map(|id| m[id]), dense[i][i]);
            }
        }
    }

    #[test]
    fn test_swap_rejects_invalid_index() {
        let mut m = sample();
        assert_eq!(m.swap_rows(0, 2), Err(NodalError::out_of_range(0, 4)));
        assert_eq!(m.swap_columns(1, 9), Err(NodalError::out_of_range(9, 4)));
    }

    #[test]
    fn test_clear_keeps_structure() {
        let mut m = sample();
        let count = m.element_count();
        m.clear();
        assert_eq!(m.element_count(), count);
        assert!(positions(&m).iter().all(|&(_, _, v)| v == 0.0));
    }
}
