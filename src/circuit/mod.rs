//! Circuit representation and validation.
//!
//! The [`UnknownRegistry`] hands out equation indices for node voltages and
//! branch currents. A [`Circuit`] owns the devices and wires their pins to
//! those unknowns.

mod graph;
mod registry;
mod types;
mod validate;

pub use graph::Circuit;
pub use registry::UnknownRegistry;
pub use types::*;
pub use validate::validate_circuit;
