//! Pivot search strategies tried in order by [`Markowitz`].
//!
//! Each strategy inspects the active submatrix at one elimination step and
//! either proposes a pivot or passes. Within a strategy the first acceptable
//! candidate in traversal order wins.

use crate::sparse::{ElementId, Scalar, SparseMatrix};

use super::markowitz::Markowitz;

/// One link of the pivot search chain.
pub trait SearchStrategy<T: Scalar> {
    /// Short name used in trace output.
    fn name(&self) -> &'static str;

    /// Propose a pivot for elimination step `step`, or pass.
    fn find_pivot(
        &self,
        markowitz: &Markowitz<T>,
        matrix: &SparseMatrix<T>,
        step: usize,
    ) -> Option<ElementId>;
}

/// Picks a pivot whose row or column holds no other active element.
///
/// Such pivots create no fill-in at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Singleton;

impl<T: Scalar> SearchStrategy<T> for Singleton {
    fn name(&self) -> &'static str {
        "singleton"
    }

    fn find_pivot(
        &self,
        markowitz: &Markowitz<T>,
        matrix: &SparseMatrix<T>,
        step: usize,
    ) -> Option<ElementId> {
        if markowitz.singletons() == 0 {
            return None;
        }

        for i in step..=matrix.size() {
            if markowitz.product(i) != 0 {
                continue;
            }

            // Column singleton: the only active element of column i
            if markowitz.column_count(i) == 0 {
                let candidate = matrix
                    .column(i)
                    .find(|&id| matrix.row_of(id) >= step);
                if let Some(id) = candidate {
                    if markowitz.is_valid_pivot(matrix, id, step) {
                        return Some(id);
                    }
                }
            }

            // Row singleton: the only active element of row i
            if markowitz.row_count(i) == 0 {
                let candidate = matrix.row(i).find(|&id| matrix.col_of(id) >= step);
                if let Some(id) = candidate {
                    if markowitz.is_valid_pivot(matrix, id, step) {
                        return Some(id);
                    }
                }
            }
        }
        None
    }
}

/// Cheap diagonal scan: only the diagonal with the lowest Markowitz product
/// is considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickDiagonal;

impl<T: Scalar> SearchStrategy<T> for QuickDiagonal {
    fn name(&self) -> &'static str {
        "quick diagonal"
    }

    fn find_pivot(
        &self,
        markowitz: &Markowitz<T>,
        matrix: &SparseMatrix<T>,
        step: usize,
    ) -> Option<ElementId> {
        let mut best: Option<(i32, ElementId)> = None;
        for i in step..=matrix.size() {
            let Some(id) = matrix.diagonal(i) else {
                continue;
            };
            if matrix[id].magnitude() <= markowitz.absolute_threshold {
                continue;
            }
            let product = markowitz.product(i);
            if best.map_or(true, |(p, _)| product < p) {
                best = Some((product, id));
            }
        }

        let (_, id) = best?;
        markowitz.is_valid_pivot(matrix, id, step).then_some(id)
    }
}

/// Full diagonal scan ranked by Markowitz product.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchDiagonal;

impl<T: Scalar> SearchStrategy<T> for SearchDiagonal {
    fn name(&self) -> &'static str {
        "diagonal"
    }

    fn find_pivot(
        &self,
        markowitz: &Markowitz<T>,
        matrix: &SparseMatrix<T>,
        step: usize,
    ) -> Option<ElementId> {
        let mut best: Option<(i32, ElementId)> = None;
        for i in step..=matrix.size() {
            let product = markowitz.product(i);
            if best.is_some_and(|(p, _)| product >= p) {
                continue;
            }
            let Some(id) = matrix.diagonal(i) else {
                continue;
            };
            if markowitz.is_valid_pivot(matrix, id, step) {
                best = Some((product, id));
            }
        }
        best.map(|(_, id)| id)
    }
}

/// Exhaustive scan of the active submatrix.
///
/// Prefers the valid element with the lowest Markowitz product. When no
/// element passes the threshold test the largest element is taken anyway;
/// only an all-zero active submatrix yields no pivot.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntireMatrix;

impl<T: Scalar> SearchStrategy<T> for EntireMatrix {
    fn name(&self) -> &'static str {
        "entire matrix"
    }

    fn find_pivot(
        &self,
        markowitz: &Markowitz<T>,
        matrix: &SparseMatrix<T>,
        step: usize,
    ) -> Option<ElementId> {
        let mut best: Option<(i64, ElementId)> = None;
        let mut largest: Option<(f64, ElementId)> = None;

        for col in step..=matrix.size() {
            for id in matrix.column(col).filter(|&id| matrix.row_of(id) >= step) {
                let magnitude = matrix[id].magnitude();
                if magnitude > largest.map_or(0.0, |(m, _)| m) {
                    largest = Some((magnitude, id));
                }

                let row = matrix.row_of(id);
                let product =
                    i64::from(markowitz.row_count(row)) * i64::from(markowitz.column_count(col));
                if best.is_some_and(|(p, _)| product >= p) {
                    continue;
                }
                if markowitz.is_valid_pivot(matrix, id, step) {
                    best = Some((product, id));
                }
            }
        }

        if let Some((_, id)) = best {
            return Some(id);
        }
        let (magnitude, id) = largest?;
        log::warn!(
            "Pivot at step {} below relative threshold, using largest element ({}, {}) with magnitude {:.3e}",
            step,
            matrix.row_of(id),
            matrix.col_of(id),
            magnitude
        );
        Some(id)
    }
}
