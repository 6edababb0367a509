//! Markowitz pivot selection.
//!
//! At elimination step `k` the active submatrix is every row and column
//! with index `>= k`. For each index `i` in that range we keep:
//!
//! - the row count: active nonzeros in row `i` minus one, plus one when the
//!   right-hand side has an entry in that row
//! - the column count: active nonzeros in column `i` minus one
//! - the product of the two, which bounds the fill-in a pivot at `(i, i)`
//!   could create
//!
//! A zero product marks a singleton. Counts are capped so the product never
//! overflows 32-bit arithmetic, and they are maintained incrementally as
//! pivots are moved and eliminated.

use std::fmt;

use crate::sparse::{ElementId, Scalar, SparseMatrix, SparseVector};

use super::strategies::{
    EntireMatrix, QuickDiagonal, SearchDiagonal, SearchStrategy, Singleton,
};

/// Largest stored count; its square still fits in an `i32`.
pub const MAX_MARKOWITZ_COUNT: i32 = 46340;

/// Default relative pivot threshold.
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 1e-3;

/// Default absolute pivot threshold.
pub const DEFAULT_ABSOLUTE_THRESHOLD: f64 = 0.0;

/// Stateful Markowitz pivot strategy bound to one matrix.
pub struct Markowitz<T: Scalar> {
    row_counts: Vec<i32>,
    col_counts: Vec<i32>,
    products: Vec<i32>,
    singletons: usize,
    /// A pivot must exceed the largest element below it times this factor.
    pub relative_threshold: f64,
    /// A pivot magnitude must exceed this value.
    pub absolute_threshold: f64,
    strategies: Vec<Box<dyn SearchStrategy<T>>>,
}

impl<T: Scalar> fmt::Debug for Markowitz<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Markowitz")
            .field("singletons", &self.singletons)
            .field("relative_threshold", &self.relative_threshold)
            .field("absolute_threshold", &self.absolute_threshold)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Scalar> Default for Markowitz<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Markowitz<T> {
    /// Create a strategy with the default search chain:
    /// singletons, quick diagonal, full diagonal, entire matrix.
    pub fn new() -> Self {
        Self {
            row_counts: Vec::new(),
            col_counts: Vec::new(),
            products: Vec::new(),
            singletons: 0,
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
            strategies: vec![
                Box::new(Singleton),
                Box::new(QuickDiagonal),
                Box::new(SearchDiagonal),
                Box::new(EntireMatrix),
            ],
        }
    }

    /// Replace the search chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn SearchStrategy<T>>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Set the pivot thresholds.
    pub fn with_thresholds(mut self, relative: f64, absolute: f64) -> Self {
        self.relative_threshold = relative;
        self.absolute_threshold = absolute;
        self
    }

    /// Row count of index `i`.
    pub fn row_count(&self, i: usize) -> i32 {
        self.row_counts.get(i).copied().unwrap_or(0)
    }

    /// Column count of index `i`.
    pub fn column_count(&self, i: usize) -> i32 {
        self.col_counts.get(i).copied().unwrap_or(0)
    }

    /// Markowitz product of index `i`.
    pub fn product(&self, i: usize) -> i32 {
        self.products.get(i).copied().unwrap_or(0)
    }

    /// Number of singletons in the active submatrix.
    pub fn singletons(&self) -> usize {
        self.singletons
    }

    /// Whether the counts have been initialised.
    pub fn is_setup(&self) -> bool {
        !self.products.is_empty()
    }

    /// Count the active submatrix from scratch, starting at `step`.
    pub fn setup(&mut self, matrix: &SparseMatrix<T>, rhs: &SparseVector<T>, step: usize) {
        let size = matrix.size();
        if self.products.len() != size + 1 {
            self.row_counts = vec![0; size + 1];
            self.col_counts = vec![0; size + 1];
            self.products = vec![0; size + 1];
        }

        for i in step..=size {
            let mut count = -1;
            count += matrix.row(i).filter(|&id| matrix.col_of(id) >= step).count() as i32;
            if rhs.find_element(i).is_some() {
                count += 1;
            }
            self.row_counts[i] = count.min(MAX_MARKOWITZ_COUNT);

            let mut count = -1;
            count += matrix
                .column(i)
                .filter(|&id| matrix.row_of(id) >= step)
                .count() as i32;
            self.col_counts[i] = count.min(MAX_MARKOWITZ_COUNT);
        }

        self.singletons = 0;
        for i in step..=size {
            self.products[i] = self.row_counts[i] * self.col_counts[i];
            if self.products[i] == 0 {
                self.singletons += 1;
            }
        }
        log::trace!(
            "Markowitz setup at step {}: {} singletons",
            step,
            self.singletons
        );
    }

    /// Recompute the product of `i` and keep the singleton tally in step.
    fn refresh(&mut self, i: usize) {
        let old = self.products[i];
        let new = self.row_counts[i] * self.col_counts[i];
        self.products[i] = new;
        match (old == 0, new == 0) {
            (true, false) => self.singletons -= 1,
            (false, true) => self.singletons += 1,
            _ => {}
        }
    }

    /// Exchange counts so they follow a pivot moving from (`row`, `col`)
    /// to (`step`, `step`).
    ///
    /// Must be called before the matrix rows and columns are swapped.
    pub fn move_pivot(&mut self, row: usize, col: usize, step: usize) {
        if !self.is_setup() {
            return;
        }
        if row != step {
            self.row_counts.swap(row, step);
            self.refresh(row);
        }
        if col != step {
            self.col_counts.swap(col, step);
            self.refresh(col);
        }
        self.refresh(step);
    }

    /// Update counts after the pivot at (`step`, `step`) was chosen.
    ///
    /// Rows with an entry below the pivot and columns with an entry right of
    /// it lose one count. Index `step` then leaves the active submatrix.
    pub fn update(&mut self, matrix: &SparseMatrix<T>, pivot: ElementId, step: usize) {
        if !self.is_setup() {
            return;
        }
        for id in matrix.below_of(pivot) {
            let row = matrix.row_of(id);
            self.row_counts[row] -= 1;
            self.refresh(row);
        }
        for id in matrix.right_of(pivot) {
            let col = matrix.col_of(id);
            self.col_counts[col] -= 1;
            self.refresh(col);
        }
        if self.products[step] == 0 {
            self.singletons -= 1;
        }
        // Keep the retired slot out of later transitions
        self.products[step] = -1;
    }

    /// Account for a fill-in created at (`row`, `col`) during elimination.
    pub fn create_fillin(&mut self, row: usize, col: usize) {
        if !self.is_setup() {
            return;
        }
        self.row_counts[row] = (self.row_counts[row] + 1).min(MAX_MARKOWITZ_COUNT);
        self.refresh(row);
        self.col_counts[col] = (self.col_counts[col] + 1).min(MAX_MARKOWITZ_COUNT);
        self.refresh(col);
    }

    /// Whether `pivot` is numerically acceptable at elimination step `step`.
    ///
    /// The magnitude must exceed the absolute threshold and the largest other
    /// active element of its column times the relative threshold.
    pub fn is_valid_pivot(&self, matrix: &SparseMatrix<T>, pivot: ElementId, step: usize) -> bool {
        let magnitude = matrix[pivot].magnitude();
        if !(magnitude > self.absolute_threshold) {
            return false;
        }
        let largest = self.largest_in_column(matrix, pivot, step);
        largest * self.relative_threshold < magnitude
    }

    /// Largest magnitude among the other active elements in the pivot column.
    pub fn largest_in_column(&self, matrix: &SparseMatrix<T>, pivot: ElementId, step: usize) -> f64 {
        matrix
            .column(matrix.col_of(pivot))
            .filter(|&id| id != pivot && matrix.row_of(id) >= step)
            .map(|id| matrix[id].magnitude())
            .fold(0.0, f64::max)
    }

    /// Run the search chain; the first strategy with a candidate wins.
    pub fn find_pivot(&self, matrix: &SparseMatrix<T>, step: usize) -> Option<ElementId> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.find_pivot(self, matrix, step);
            if let Some(id) = found {
                log::trace!(
                    "step {}: {} chose ({}, {})",
                    step,
                    strategy.name(),
                    matrix.row_of(id),
                    matrix.col_of(id)
                );
            }
            found
        })
    }
}
