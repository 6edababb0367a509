//! # Nodal Core
//!
//! The numerical engine of a SPICE-style circuit simulator.
//!
//! This library provides:
//! - A sparse matrix with stable element handles and dynamic pivoting
//! - Markowitz-ordered LU factorization that reuses its pivot order
//! - A Newton-Raphson controller for arbitrary nonlinear device models
//! - Multistep integration (Gear, trapezoidal, fixed-step Euler) with
//!   truncation-error timestep control
//! - Operating point, transient and small-signal analyses
//!
//! ## Architecture
//!
//! - [`sparse`] - Linked sparse matrix and vector storage
//! - [`solver`] - LU factorization, pivoting strategies and Newton-Raphson
//! - [`integration`] - History buffers and integration methods
//! - [`behaviors`] - Capability traits devices implement
//! - [`components`] - Device models (R, L, C, sources, controlled sources, diode)
//! - [`circuit`] - Unknown registry and circuit assembly
//! - [`simulation`] - Analyses and their configuration
//!
//! ## Usage
//!
//! ```no_run
//! use nodal_core::components::{Resistor, VoltageSource};
//! use nodal_core::{Circuit, Simulator};
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::new("V1", 10.0), &["in", "0"])?;
//! circuit.add(Resistor::new("R1", 1e3)?, &["in", "out"])?;
//! circuit.add(Resistor::new("R2", 1e3)?, &["out", "0"])?;
//!
//! let mut sim = Simulator::new(circuit);
//! sim.operating_point()?;
//! assert!((sim.value("out")? - 5.0).abs() < 1e-9);
//! # Ok::<(), nodal_core::NodalError>(())
//! ```
//!
//! ## Modified Nodal Analysis
//!
//! Every node voltage except ground and every branch current a device
//! introduces is one unknown. Devices stamp their linearized contributions
//! into the matrix through handles obtained once at bind time, so the
//! structure of the system is fixed before the first solve and only the
//! values change between iterations and timepoints.

pub mod behaviors;
pub mod circuit;
pub mod components;
pub mod error;
pub mod integration;
pub mod simulation;
pub mod solver;
pub mod sparse;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{NodalError, Result};
pub use simulation::Simulator;

/// Boltzmann constant in J/K
pub const BOLTZMANN: f64 = 1.380649e-23;

/// Elementary charge in C
pub const CHARGE: f64 = 1.602176634e-19;

/// Offset between Celsius and Kelvin
pub const KELVIN: f64 = 273.15;

/// Default circuit and nominal temperature (27 °C) in Kelvin
pub const REFERENCE_TEMPERATURE: f64 = 300.15;
