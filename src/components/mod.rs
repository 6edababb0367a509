//! Component models for circuit simulation.
//!
//! This module provides reference models for the capability interfaces in
//! [`behaviors`](crate::behaviors):
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source (DC, pulse, sine)
//! - Controlled: VCCS, VCVS
//! - Nonlinear: Diode
//!
//! Each component binds its stamps once and accumulates into them on every
//! load.

mod controlled;
mod diode;
mod linear;
mod sources;

pub use controlled::{Vccs, Vcvs};
pub use diode::{limit_junction, Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource, Waveform};
