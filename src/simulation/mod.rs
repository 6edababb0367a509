//! Analyses driving the solver: operating point, transient and small-signal.
//!
//! A [`Simulator`] owns a [`Circuit`](crate::circuit::Circuit) and runs the
//! analyses on it. Every analysis shares one [`SimulationState`]: the
//! present solution, the iteration mode and the stepping factors devices
//! read while loading.
//!
//! ## Operating point
//!
//! A direct Newton-Raphson solve is tried first. When it fails the
//! simulator falls back to gmin stepping (a shunt conductance on every
//! diagonal, lowered a decade per step) and then to source stepping
//! (independent sources ramped from zero).
//!
//! ## Transient
//!
//! Starts from the operating point at the initial time and advances with
//! the configured [`IntegrationMethod`](crate::integration::IntegrationMethod).
//! Each timepoint is judged by its local truncation error; failed Newton
//! iterations cut the step by eight and restart at first order.
//!
//! ## Small-signal
//!
//! Devices stamp complex admittances linearized at the operating point into
//! a second, complex-valued solver.

mod ac;
mod config;
mod load;
mod op;
mod simulator;
mod state;
mod transient;

pub use config::{BaseConfiguration, TimeConfiguration};
pub use simulator::Simulator;
pub use state::{Diagnostics, SimulationState};
pub use transient::{TimePoint, TransientStats};
