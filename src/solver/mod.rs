//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = z where:
//! - x contains node voltages and branch currents
//! - A is the conductance/coefficient matrix
//! - z is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is usually 0 (for ideal voltage sources)
//! - v is the vector of node voltages
//! - j is the vector of voltage source currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! ## Sparse LU
//!
//! [`Solver`] keeps A in a [`SparseMatrix`](crate::sparse::SparseMatrix)
//! and factors it in place. Pivots are chosen by the [`Markowitz`] strategy,
//! which trades numerical stability (a relative magnitude threshold) against
//! fill-in (the Markowitz product). The order found on the first
//! factorization is reused as long as the topology is unchanged and every
//! cached pivot stays usable.
//!
//! ## Nonlinear iteration
//!
//! [`NewtonRaphson`] drives any [`NonlinearSystem`] through repeated
//! Load, Factor and Solve passes until the solution settles.

mod markowitz;
mod mna;
mod newton;
mod strategies;

pub use markowitz::{
    Markowitz, DEFAULT_ABSOLUTE_THRESHOLD, DEFAULT_RELATIVE_THRESHOLD, MAX_MARKOWITZ_COUNT,
};
pub use mna::Solver;
pub use newton::{InitMode, NewtonRaphson, NonlinearSystem};
pub use strategies::{EntireMatrix, QuickDiagonal, SearchDiagonal, SearchStrategy, Singleton};

/// Relative convergence tolerance for Newton-Raphson iteration.
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Absolute convergence tolerance on branch currents.
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-12;

/// Absolute convergence tolerance on node voltages.
pub const DEFAULT_VOLTAGE_TOLERANCE: f64 = 1e-6;

/// Maximum Newton-Raphson iterations for an operating point.
pub const MAX_ITERATIONS: usize = 100;

/// Minimum conductance to prevent singular matrix.
pub const MIN_CONDUCTANCE: f64 = 1e-12;
