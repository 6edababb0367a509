//! Sparse storage for the linearized MNA system.
//!
//! The matrix and vector are arenas of elements addressed by integer
//! handles. Devices obtain their handles once at setup and stamp through
//! them on every iteration; the solver permutes rows and columns underneath
//! without invalidating any handle.

mod matrix;
mod scalar;
mod translation;
mod vector;

pub use matrix::{Chain, ElementId, SparseMatrix};
pub use scalar::Scalar;
pub use translation::Translation;
pub use vector::{SparseVector, VectorId};
