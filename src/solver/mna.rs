//! Sparse LU solver for the MNA system Ax = z.
//!
//! Devices address the system by external equation index. Internally the
//! solver permutes rows and columns to keep pivots stable and fill-in low,
//! and keeps [`Translation`] maps to get back to external order.
//!
//! The factors are stored in place: after elimination the diagonal holds the
//! reciprocal of each pivot, the strict lower triangle holds L and the strict
//! upper triangle holds U scaled to a unit diagonal.

use std::ops::{Index, IndexMut};

use crate::error::{NodalError, Result};
use crate::sparse::{ElementId, Scalar, SparseMatrix, SparseVector, Translation, VectorId};

use super::markowitz::Markowitz;

/// Sparse linear system with Markowitz ordering and LU factorization.
pub struct Solver<T: Scalar> {
    matrix: SparseMatrix<T>,
    rhs: SparseVector<T>,
    strategy: Markowitz<T>,
    rows: Translation,
    columns: Translation,
    intermediate: Vec<T>,
    fillins: usize,
    needs_reordering: bool,
    is_factored: bool,
    is_preordered: bool,
    bound: Option<usize>,
}

impl<T: Scalar> Default for Solver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Solver<T> {
    /// Create an empty solver. The system grows as elements are requested.
    pub fn new() -> Self {
        Self::with_strategy(Markowitz::new())
    }

    /// Create an empty solver using a configured pivot strategy.
    pub fn with_strategy(strategy: Markowitz<T>) -> Self {
        Self {
            matrix: SparseMatrix::new(),
            rhs: SparseVector::new(),
            strategy,
            rows: Translation::new(),
            columns: Translation::new(),
            intermediate: Vec::new(),
            fillins: 0,
            needs_reordering: true,
            is_factored: false,
            is_preordered: false,
            bound: None,
        }
    }

    /// Create a solver pre-sized for `size` equations.
    pub fn with_size(size: usize) -> Self {
        let mut solver = Self::new();
        solver.expand(size);
        solver
    }

    /// Forbid growth beyond the current size.
    ///
    /// Requests for larger indices then fail with a structural error.
    pub fn fix_size(&mut self) {
        self.bound = Some(self.size());
    }

    /// Allow the system to grow again.
    pub fn unfix_size(&mut self) {
        self.bound = None;
    }

    /// Number of equations.
    pub fn size(&self) -> usize {
        self.matrix.size()
    }

    /// Number of fill-in elements created so far.
    pub fn fillins(&self) -> usize {
        self.fillins
    }

    /// Whether the next factorization must search for a new pivot order.
    pub fn needs_reordering(&self) -> bool {
        self.needs_reordering
    }

    /// Force a full reordering at the next [`order_and_factor`](Self::order_and_factor).
    pub fn set_needs_reordering(&mut self) {
        self.needs_reordering = true;
    }

    /// Whether the matrix holds a valid LU factorization.
    pub fn is_factored(&self) -> bool {
        self.is_factored
    }

    /// The pivot strategy.
    pub fn strategy(&self) -> &Markowitz<T> {
        &self.strategy
    }

    /// The pivot strategy, for adjusting thresholds between solves.
    pub fn strategy_mut(&mut self) -> &mut Markowitz<T> {
        &mut self.strategy
    }

    /// Read-only view of the internal (permuted) matrix.
    pub fn matrix(&self) -> &SparseMatrix<T> {
        &self.matrix
    }

    /// Read-only view of the internal (permuted) right-hand side.
    pub fn rhs(&self) -> &SparseVector<T> {
        &self.rhs
    }

    /// Internal row holding external equation `row`.
    pub fn internal_row(&self, row: usize) -> usize {
        self.rows.internal(row)
    }

    /// Internal column holding external unknown `col`.
    pub fn internal_column(&self, col: usize) -> usize {
        self.columns.internal(col)
    }

    /// Grow the system to at least `size` equations.
    pub fn expand(&mut self, size: usize) {
        self.rows.expand(size);
        self.columns.expand(size);
        self.matrix.expand(size);
        self.rhs.expand(size);
        if self.intermediate.len() < size + 1 {
            self.intermediate.resize(size + 1, T::zero());
        }
    }

    fn check_bound(&self, index: usize) -> Result<()> {
        match self.bound {
            Some(bound) if index > bound => Err(NodalError::out_of_range(index, bound)),
            _ => Ok(()),
        }
    }

    /// Get the matrix element for external (`row`, `col`), creating it if
    /// needed.
    ///
    /// Row or column 0 is ground and yields [`ElementId::TRASH`]. Creating a
    /// new element invalidates the current pivot order.
    pub fn get_matrix_element(&mut self, row: usize, col: usize) -> Result<ElementId> {
        self.check_bound(row)?;
        self.check_bound(col)?;
        if row == 0 || col == 0 {
            return Ok(ElementId::TRASH);
        }
        self.expand(row.max(col));
        let (id, created) = self
            .matrix
            .get_or_create(self.rows.internal(row), self.columns.internal(col));
        if created && !self.needs_reordering {
            log::debug!("New matrix element ({}, {}) invalidates pivot order", row, col);
            self.needs_reordering = true;
        }
        Ok(id)
    }

    /// Find the matrix element for external (`row`, `col`) without creating it.
    pub fn find_matrix_element(&self, row: usize, col: usize) -> Option<ElementId> {
        if row > self.size() || col > self.size() {
            return None;
        }
        self.matrix
            .find_element(self.rows.internal(row), self.columns.internal(col))
    }

    /// Get the right-hand side entry of external equation `row`.
    pub fn get_rhs_element(&mut self, row: usize) -> Result<VectorId> {
        self.check_bound(row)?;
        if row == 0 {
            return Ok(VectorId::TRASH);
        }
        self.expand(row);
        Ok(self.rhs.get_element(self.rows.internal(row)))
    }

    /// Find the right-hand side entry of external equation `row`.
    pub fn find_rhs_element(&self, row: usize) -> Option<VectorId> {
        if row > self.size() {
            return None;
        }
        self.rhs.find_element(self.rows.internal(row))
    }

    /// Zero the matrix and right-hand side, keeping structure and order.
    pub fn clear(&mut self) {
        self.matrix.clear();
        self.rhs.clear();
        self.is_factored = false;
    }

    /// Add `gmin` to every diagonal element.
    pub fn apply_diagonal_gmin(&mut self, gmin: f64) {
        if gmin <= 0.0 {
            return;
        }
        let g = T::from_real(gmin);
        for i in 1..=self.size() {
            if let Some(id) = self.matrix.diagonal(i) {
                self.matrix[id] += g;
            }
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        self.matrix.swap_rows(a, b)?;
        self.rhs.swap(a, b)?;
        self.rows.swap(a, b)
    }

    fn swap_columns(&mut self, a: usize, b: usize) -> Result<()> {
        self.matrix.swap_columns(a, b)?;
        self.columns.swap(a, b)
    }

    /// Move `pivot` onto the diagonal at `step` and update the pivot counts.
    pub fn move_pivot(&mut self, pivot: ElementId, step: usize) -> Result<()> {
        let row = self.matrix.row_of(pivot);
        let col = self.matrix.col_of(pivot);
        if row < step || col < step || step > self.size() {
            return Err(NodalError::invalid_argument(format!(
                "pivot ({row}, {col}) is outside the active submatrix at step {step}"
            )));
        }
        self.strategy.move_pivot(row, col, step);
        if row != step {
            self.swap_rows(row, step)?;
        }
        if col != step {
            self.swap_columns(col, step)?;
        }
        self.strategy.update(&self.matrix, pivot, step);
        Ok(())
    }

    /// Swap columns so that structurally missing diagonals of voltage-source
    /// style equations become nonzero.
    ///
    /// A column without a diagonal element is fixed when it holds a ±1 entry
    /// at row `r` whose mirror at (`col`, `r`) is also ±1. Columns with a
    /// single such twin pair are handled first; one column with several pairs
    /// is resolved per extra pass. Runs at most once per solver.
    pub fn preorder_mna(&mut self) -> Result<()> {
        if self.is_preordered {
            return Ok(());
        }
        self.is_preordered = true;

        let size = self.size();
        let mut start = 1;
        let mut swaps = 0;
        loop {
            let mut another_pass = false;
            for col in start..=size {
                if self.matrix.diagonal(col).is_some() {
                    continue;
                }
                let (twins, pair) = self.count_twins(col);
                if twins == 1 {
                    if let Some(row) = pair {
                        self.swap_columns(col, row)?;
                        swaps += 1;
                    }
                } else if twins > 1 && !another_pass {
                    another_pass = true;
                    start = col;
                }
            }

            if !another_pass {
                break;
            }
            let mut swapped = false;
            for col in start..=size {
                if swapped {
                    break;
                }
                if self.matrix.diagonal(col).is_some() {
                    continue;
                }
                if let (_, Some(row)) = self.count_twins(col) {
                    self.swap_columns(col, row)?;
                    swaps += 1;
                    swapped = true;
                }
            }
            if !swapped {
                break;
            }
        }
        log::debug!("MNA preordering made {} column swaps", swaps);
        Ok(())
    }

    /// Count symmetric ±1 pairs for a column lacking its diagonal.
    ///
    /// Returns the count (stopping at 2) and the row of the first pair.
    fn count_twins(&self, col: usize) -> (usize, Option<usize>) {
        let mut twins = 0;
        let mut first = None;
        for id in self.matrix.column(col) {
            if self.matrix[id].magnitude() != 1.0 {
                continue;
            }
            let row = self.matrix.row_of(id);
            let mirrored = self
                .matrix
                .find_element(col, row)
                .is_some_and(|twin| self.matrix[twin].magnitude() == 1.0);
            if mirrored {
                twins += 1;
                if twins >= 2 {
                    return (twins, first);
                }
                first = Some(row);
            }
        }
        (twins, first)
    }

    /// Factor the matrix, reordering if needed.
    ///
    /// Without a pending reorder the cached pivot order is reused and each
    /// diagonal pivot is only checked for magnitude. The first pivot that
    /// fails the check restarts the Markowitz search from that step.
    pub fn order_and_factor(&mut self) -> Result<()> {
        let size = self.size();
        let mut step = 1;

        if !self.needs_reordering {
            while step <= size {
                let pivot = self.matrix.diagonal(step);
                match pivot {
                    Some(id) if self.strategy.is_valid_pivot(&self.matrix, id, step) => {
                        self.eliminate(id, step, false)?;
                        step += 1;
                    }
                    _ => {
                        log::debug!("Cached pivot order failed at step {}, reordering", step);
                        self.needs_reordering = true;
                        break;
                    }
                }
            }
            if !self.needs_reordering {
                self.is_factored = true;
                return Ok(());
            }
        }

        self.strategy.setup(&self.matrix, &self.rhs, step);
        let fillins_before = self.fillins;
        while step <= size {
            let pivot = self
                .strategy
                .find_pivot(&self.matrix, step)
                .ok_or_else(|| NodalError::singular(step))?;
            self.move_pivot(pivot, step)?;
            self.eliminate(pivot, step, true)?;
            step += 1;
        }
        log::debug!(
            "Reordered {} equations, {} new fill-ins",
            size,
            self.fillins - fillins_before
        );
        self.is_factored = true;
        self.needs_reordering = false;
        Ok(())
    }

    /// Factor the matrix with the cached pivot order.
    ///
    /// Returns `false` when a pivot is missing or unusable; the pivot order is
    /// then invalidated and the caller must reload and call
    /// [`order_and_factor`](Self::order_and_factor).
    pub fn factor(&mut self) -> bool {
        if self.needs_reordering {
            return false;
        }
        for step in 1..=self.size() {
            let usable = self
                .matrix
                .diagonal(step)
                .filter(|&id| self.matrix[id].magnitude() > self.strategy.absolute_threshold);
            let Some(pivot) = usable else {
                self.needs_reordering = true;
                return false;
            };
            if self.eliminate(pivot, step, false).is_err() {
                self.needs_reordering = true;
                return false;
            }
        }
        self.is_factored = true;
        true
    }

    /// Eliminate the column below `pivot` and update the remaining submatrix.
    fn eliminate(&mut self, pivot: ElementId, step: usize, ordering: bool) -> Result<()> {
        let value = self.matrix[pivot];
        if value.magnitude() == 0.0 || !value.is_finite() {
            return Err(NodalError::singular(step));
        }
        let reciprocal = T::one() / value;
        self.matrix[pivot] = reciprocal;

        let mut upper = self.matrix.right(pivot);
        while let Some(u) = upper {
            self.matrix[u] *= reciprocal;
            let u_value = self.matrix[u];
            let u_col = self.matrix.col_of(u);

            let mut sub = self.matrix.below(u);
            let mut lower = self.matrix.below(pivot);
            while let Some(l) = lower {
                let row = self.matrix.row_of(l);
                while let Some(s) = sub {
                    if self.matrix.row_of(s) >= row {
                        break;
                    }
                    sub = self.matrix.below(s);
                }
                let target = match sub {
                    Some(s) if self.matrix.row_of(s) == row => s,
                    _ => {
                        let (id, _) = self.matrix.get_or_create(row, u_col);
                        self.fillins += 1;
                        if ordering {
                            self.strategy.create_fillin(row, u_col);
                        }
                        id
                    }
                };
                let l_value = self.matrix[l];
                self.matrix[target] -= u_value * l_value;
                sub = self.matrix.below(target);
                lower = self.matrix.below(l);
            }
            upper = self.matrix.right(u);
        }
        Ok(())
    }

    /// Solve the factored system.
    ///
    /// `solution` is indexed by external unknown and resized to `size + 1`;
    /// entry 0 (ground) is always zero.
    pub fn solve(&mut self, solution: &mut Vec<T>) -> Result<()> {
        self.ensure_factored()?;
        let size = self.size();
        self.intermediate.iter_mut().for_each(|v| *v = T::zero());
        for (index, value) in self.rhs.iter() {
            self.intermediate[index] = value;
        }

        // Forward substitution with L
        for i in 1..=size {
            let mut temp = self.intermediate[i];
            if temp == T::zero() {
                continue;
            }
            let Some(pivot) = self.matrix.diagonal(i) else {
                return Err(NodalError::singular(i));
            };
            temp *= self.matrix[pivot];
            self.intermediate[i] = temp;
            for id in self.matrix.below_of(pivot) {
                let row = self.matrix.row_of(id);
                let delta = temp * self.matrix[id];
                self.intermediate[row] -= delta;
            }
        }

        // Backward substitution with unit U
        for i in (1..=size).rev() {
            let Some(pivot) = self.matrix.diagonal(i) else {
                return Err(NodalError::singular(i));
            };
            let mut temp = self.intermediate[i];
            for id in self.matrix.right_of(pivot) {
                temp -= self.matrix[id] * self.intermediate[self.matrix.col_of(id)];
            }
            self.intermediate[i] = temp;
        }

        solution.clear();
        solution.resize(size + 1, T::zero());
        for i in 1..=size {
            solution[self.columns.external(i)] = self.intermediate[i];
        }
        Ok(())
    }

    /// Solve the transposed system Aᵀx = b with the same factors.
    ///
    /// The right-hand side keeps its external indexing; `solution` is indexed
    /// the same way.
    pub fn solve_transposed(&mut self, solution: &mut Vec<T>) -> Result<()> {
        self.ensure_factored()?;
        let size = self.size();

        let mut external = vec![T::zero(); size + 1];
        for (index, value) in self.rhs.iter() {
            external[self.rows.external(index)] = value;
        }
        self.intermediate.iter_mut().for_each(|v| *v = T::zero());
        for j in 1..=size {
            self.intermediate[j] = external[self.columns.external(j)];
        }

        // Forward substitution with Uᵀ
        for i in 1..=size {
            let temp = self.intermediate[i];
            if temp == T::zero() {
                continue;
            }
            let Some(pivot) = self.matrix.diagonal(i) else {
                return Err(NodalError::singular(i));
            };
            for id in self.matrix.right_of(pivot) {
                let col = self.matrix.col_of(id);
                let delta = temp * self.matrix[id];
                self.intermediate[col] -= delta;
            }
        }

        // Backward substitution with Lᵀ
        for i in (1..=size).rev() {
            let Some(pivot) = self.matrix.diagonal(i) else {
                return Err(NodalError::singular(i));
            };
            let mut temp = self.intermediate[i];
            for id in self.matrix.below_of(pivot) {
                temp -= self.matrix[id] * self.intermediate[self.matrix.row_of(id)];
            }
            self.intermediate[i] = temp * self.matrix[pivot];
        }

        solution.clear();
        solution.resize(size + 1, T::zero());
        for i in 1..=size {
            solution[self.rows.external(i)] = self.intermediate[i];
        }
        Ok(())
    }

    fn ensure_factored(&self) -> Result<()> {
        if self.is_factored {
            Ok(())
        } else {
            Err(NodalError::invalid_argument("solve called on an unfactored matrix"))
        }
    }
}

impl<T: Scalar> Index<ElementId> for Solver<T> {
    type Output = T;

    fn index(&self, id: ElementId) -> &T {
        &self.matrix[id]
    }
}

impl<T: Scalar> IndexMut<ElementId> for Solver<T> {
    fn index_mut(&mut self, id: ElementId) -> &mut T {
        &mut self.matrix[id]
    }
}

impl<T: Scalar> Index<VectorId> for Solver<T> {
    type Output = T;

    fn index(&self, id: VectorId) -> &T {
        &self.rhs[id]
    }
}

impl<T: Scalar> IndexMut<VectorId> for Solver<T> {
    fn index_mut(&mut self, id: VectorId) -> &mut T {
        &mut self.rhs[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    type Entries = Vec<(usize, usize, f64)>;

    fn stamp(solver: &mut Solver<f64>, entries: &[(usize, usize, f64)], rhs: &[f64]) {
        for &(r, c, v) in entries {
            let id = solver.get_matrix_element(r, c).unwrap();
            solver[id] += v;
        }
        for (i, &b) in rhs.iter().enumerate().skip(1) {
            let id = solver.get_rhs_element(i).unwrap();
            solver[id] += b;
        }
    }

    fn dense(n: usize, entries: &[(usize, usize, f64)]) -> Vec<Vec<f64>> {
        let mut a = vec![vec![0.0; n + 1]; n + 1];
        for &(r, c, v) in entries {
            a[r][c] += v;
        }
        a
    }

    fn residual(a: &[Vec<f64>], x: &[f64], b: &[f64]) -> f64 {
        let n = b.len() - 1;
        (1..=n)
            .map(|i| {
                let ax: f64 = (1..=n).map(|j| a[i][j] * x[j]).sum();
                (ax - b[i]).abs()
            })
            .fold(0.0, f64::max)
    }

    /// Diagonally dominant random system with a sparse off-diagonal pattern.
    fn random_system(rng: &mut StdRng, n: usize) -> (Entries, Vec<f64>) {
        let mut entries = Vec::new();
        for i in 1..=n {
            let mut row_sum = 0.0;
            for j in 1..=n {
                if i != j && rng.gen_bool(0.25) {
                    let v: f64 = rng.gen_range(-1.0..1.0);
                    row_sum += v.abs();
                    entries.push((i, j, v));
                }
            }
            entries.push((i, i, row_sum + rng.gen_range(0.5..2.0)));
        }
        let mut b = vec![0.0; n + 1];
        for value in b.iter_mut().skip(1) {
            *value = rng.gen_range(-5.0..5.0);
        }
        (entries, b)
    }

    #[test]
    fn test_solve_small_system() {
        // 2x + y = 5, x + 3y = 10 -> x = 1, y = 3
        let mut solver = Solver::new();
        stamp(
            &mut solver,
            &[(1, 1, 2.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 3.0)],
            &[0.0, 5.0, 10.0],
        );
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert_eq!(x[0], 0.0);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_systems_independent_of_insertion_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for n in [3, 8, 20, 40] {
            let (mut entries, b) = random_system(&mut rng, n);
            let a = dense(n, &entries);

            let mut first = Solver::new();
            stamp(&mut first, &entries, &b);
            first.order_and_factor().unwrap();
            let mut x1 = Vec::new();
            first.solve(&mut x1).unwrap();
            assert!(residual(&a, &x1, &b) < 1e-9, "n = {n}");

            entries.shuffle(&mut rng);
            let mut second = Solver::new();
            stamp(&mut second, &entries, &b);
            second.order_and_factor().unwrap();
            let mut x2 = Vec::new();
            second.solve(&mut x2).unwrap();
            for i in 1..=n {
                assert_abs_diff_eq!(x1[i], x2[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_custom_search_chain() {
        use crate::solver::{EntireMatrix, SearchDiagonal, SearchStrategy};

        let mut rng = StdRng::seed_from_u64(21);
        let n = 15;
        let (entries, b) = random_system(&mut rng, n);
        let a = dense(n, &entries);

        let chains: Vec<Vec<Box<dyn SearchStrategy<f64>>>> = vec![
            vec![Box::new(EntireMatrix)],
            vec![Box::new(SearchDiagonal), Box::new(EntireMatrix)],
        ];
        for chain in chains {
            let strategy = Markowitz::new().with_strategies(chain);
            let mut solver = Solver::with_strategy(strategy);
            stamp(&mut solver, &entries, &b);
            solver.order_and_factor().unwrap();
            let mut x = Vec::new();
            solver.solve(&mut x).unwrap();
            assert!(residual(&a, &x, &b) < 1e-9);
        }

        // Without a strategy no pivot is ever found
        let mut solver = Solver::with_strategy(Markowitz::new().with_strategies(Vec::new()));
        stamp(&mut solver, &entries, &b);
        assert!(matches!(
            solver.order_and_factor(),
            Err(NodalError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_solve_transposed() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 12;
        let (entries, b) = random_system(&mut rng, n);
        let transposed: Entries = entries.iter().map(|&(r, c, v)| (c, r, v)).collect();
        let at = dense(n, &transposed);

        let mut solver = Solver::new();
        stamp(&mut solver, &entries, &b);
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve_transposed(&mut x).unwrap();
        assert!(residual(&at, &x, &b) < 1e-9);
    }

    #[test]
    fn test_off_diagonal_pivots() {
        // Voltage source style structure: zero diagonal on the branch row
        let entries = vec![
            (1, 1, 0.1),
            (1, 3, 1.0),
            (3, 1, 1.0),
            (2, 2, 0.2),
            (2, 1, -0.1),
            (1, 2, -0.1),
        ];
        let b = vec![0.0, 0.0, 0.0, 5.0];
        let a = dense(3, &entries);
        let mut solver = Solver::new();
        stamp(&mut solver, &entries, &b);
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert!(residual(&a, &x, &b) < 1e-12);
        assert_abs_diff_eq!(x[1], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        let mut solver = Solver::new();
        stamp(
            &mut solver,
            &[(1, 1, 1.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 1.0)],
            &[0.0, 1.0, 1.0],
        );
        let err = solver.order_and_factor().unwrap_err();
        assert!(matches!(err, NodalError::SingularMatrix { .. }));
    }

    #[test]
    fn test_ground_stamps_go_to_trash() {
        let mut solver = Solver::<f64>::new();
        let trash = solver.get_matrix_element(0, 3).unwrap();
        assert!(trash.is_trash());
        solver[trash] += 42.0;
        assert_eq!(solver.size(), 0);
        assert!(solver.get_rhs_element(0).unwrap().is_trash());
    }

    #[test]
    fn test_fixed_size_rejects_growth() {
        let mut solver = Solver::<f64>::with_size(3);
        solver.fix_size();
        assert!(solver.get_matrix_element(3, 3).is_ok());
        assert_eq!(
            solver.get_matrix_element(4, 1),
            Err(NodalError::out_of_range(4, 3))
        );
        assert!(solver.get_rhs_element(5).is_err());
        solver.unfix_size();
        assert!(solver.get_matrix_element(4, 1).is_ok());
    }

    #[test]
    fn test_clear_and_restamp_is_bit_identical() {
        let mut rng = StdRng::seed_from_u64(99);
        let (entries, b) = random_system(&mut rng, 10);

        let mut fresh = Solver::new();
        stamp(&mut fresh, &entries, &b);

        let mut reused = Solver::new();
        stamp(&mut reused, &entries, &b);
        reused.clear();
        stamp(&mut reused, &entries, &b);

        for &(r, c, _) in &entries {
            let f = fresh.find_matrix_element(r, c).map(|id| fresh[id]);
            let u = reused.find_matrix_element(r, c).map(|id| reused[id]);
            assert_eq!(f.map(f64::to_bits), u.map(f64::to_bits));
        }
        for i in 1..=10 {
            let f = fresh.find_rhs_element(i).map(|id| fresh[id]);
            let u = reused.find_rhs_element(i).map(|id| reused[id]);
            assert_eq!(f.map(f64::to_bits), u.map(f64::to_bits));
        }
    }

    #[test]
    fn test_fast_path_reuses_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let (entries, b) = random_system(&mut rng, 15);
        let a = dense(15, &entries);
        let mut solver = Solver::new();
        stamp(&mut solver, &entries, &b);
        solver.order_and_factor().unwrap();
        assert!(!solver.needs_reordering());
        let fillins = solver.fillins();

        // Same topology: factor() reuses the order and creates no fill-in
        solver.clear();
        stamp(&mut solver, &entries, &b);
        assert!(solver.factor());
        assert_eq!(solver.fillins(), fillins);
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert!(residual(&a, &x, &b) < 1e-9);

        // The fast path of order_and_factor also keeps the order
        solver.clear();
        stamp(&mut solver, &entries, &b);
        solver.order_and_factor().unwrap();
        assert!(!solver.needs_reordering());
        solver.solve(&mut x).unwrap();
        assert!(residual(&a, &x, &b) < 1e-9);
    }

    #[test]
    fn test_new_element_invalidates_order() {
        let entries = vec![(1, 1, 2.0), (2, 2, 3.0), (1, 2, 1.0)];
        let b = vec![0.0, 1.0, 1.0];
        let mut solver = Solver::new();
        stamp(&mut solver, &entries, &b);
        solver.order_and_factor().unwrap();
        assert!(!solver.needs_reordering());

        solver.clear();
        stamp(&mut solver, &entries, &b);
        // Existing positions keep the order
        assert!(!solver.needs_reordering());
        let id = solver.get_matrix_element(2, 1).unwrap();
        solver[id] += 0.5;
        assert!(solver.needs_reordering());
        assert!(!solver.factor());

        solver.order_and_factor().unwrap();
        let mut extended = entries.clone();
        extended.push((2, 1, 0.5));
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert!(residual(&dense(2, &extended), &x, &b) < 1e-12);
    }

    #[test]
    fn test_bad_pivot_invalidates_order() {
        // First ordering picks the diagonal; later values make it unusable
        let mut solver = Solver::new();
        stamp(
            &mut solver,
            &[(1, 1, 4.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 4.0)],
            &[0.0, 1.0, 2.0],
        );
        solver.order_and_factor().unwrap();

        let restamp = [(1, 1, 0.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 4.0)];
        solver.clear();
        stamp(&mut solver, &restamp, &[0.0, 1.0, 2.0]);
        assert!(!solver.factor());
        assert!(solver.needs_reordering());

        // factor() consumed the values; reload then reorder
        solver.clear();
        stamp(&mut solver, &restamp, &[0.0, 1.0, 2.0]);
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert!(residual(&dense(2, &restamp), &x, &[0.0, 1.0, 2.0]) < 1e-12);

        // The fast path of order_and_factor detects the same condition itself
        let mut solver = Solver::new();
        stamp(
            &mut solver,
            &[(1, 1, 4.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 4.0)],
            &[0.0, 1.0, 2.0],
        );
        solver.order_and_factor().unwrap();
        solver.clear();
        stamp(&mut solver, &restamp, &[0.0, 1.0, 2.0]);
        solver.order_and_factor().unwrap();
        solver.solve(&mut x).unwrap();
        assert!(residual(&dense(2, &restamp), &x, &[0.0, 1.0, 2.0]) < 1e-12);
    }

    #[test]
    fn test_explicit_reorder_request() {
        let mut solver = Solver::new();
        stamp(&mut solver, &[(1, 1, 1.0), (2, 2, 1.0)], &[0.0, 1.0, 1.0]);
        solver.order_and_factor().unwrap();
        solver.set_needs_reordering();
        assert!(!solver.factor());
        solver.clear();
        stamp(&mut solver, &[(1, 1, 1.0), (2, 2, 1.0)], &[0.0, 1.0, 1.0]);
        solver.order_and_factor().unwrap();
        assert!(!solver.needs_reordering());
    }

    #[test]
    fn test_preorder_fixes_voltage_source_diagonal() {
        // Node 1 driven by a source whose branch current is unknown 2
        let entries = vec![(1, 2, 1.0), (2, 1, 1.0), (1, 1, 1e-3)];
        let mut solver = Solver::new();
        stamp(&mut solver, &entries, &[0.0, 0.0, 3.0]);
        assert!(solver.matrix().diagonal(2).is_none());
        solver.preorder_mna().unwrap();
        for i in 1..=2 {
            assert!(solver.matrix().diagonal(i).is_some(), "diagonal {i}");
        }
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[2], -3e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_gmin() {
        let mut solver = Solver::new();
        stamp(&mut solver, &[(1, 1, 1.0), (1, 2, 2.0), (2, 2, 1.0)], &[0.0]);
        solver.apply_diagonal_gmin(0.5);
        let d = solver.find_matrix_element(2, 2).unwrap();
        assert_eq!(solver[d], 1.5);
        let off = solver.find_matrix_element(1, 2).unwrap();
        assert_eq!(solver[off], 2.0);
    }

    #[test]
    fn test_complex_system() {
        // (1 + j) x = 2j -> x = 1 + j
        let mut solver = Solver::<Complex64>::new();
        let a = solver.get_matrix_element(1, 1).unwrap();
        solver[a] += Complex64::new(1.0, 1.0);
        let b = solver.get_rhs_element(1).unwrap();
        solver[b] += Complex64::new(0.0, 2.0);
        solver.order_and_factor().unwrap();
        let mut x = Vec::new();
        solver.solve(&mut x).unwrap();
        assert_abs_diff_eq!(x[1].re, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1].im, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_requires_factorization() {
        let mut solver = Solver::new();
        stamp(&mut solver, &[(1, 1, 1.0)], &[0.0, 1.0]);
        let mut x = Vec::new();
        assert!(solver.solve(&mut x).is_err());
    }
}
