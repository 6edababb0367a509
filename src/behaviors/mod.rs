//! Capability interfaces between the engine and device models.
//!
//! The engine never looks at concrete device types. A device implements
//! [`Loadable`] and opts into further analyses through the accessors of
//! [`Device`]:
//!
//! - [`TemperatureDependent`] is visited once per analysis before binding
//! - [`TimeIntegrable`] owns integration states for transient analysis
//! - [`FrequencyLoadable`] stamps complex admittances for small-signal analysis
//!
//! Binding happens exactly once, after the unknown count is fixed: each
//! device requests every matrix and right-hand side handle it will ever
//! stamp, then accumulates into those handles on every load.

mod stamps;

pub use stamps::{BranchStamp, ConductanceStamp, CurrentStamp, TransconductanceStamp};

use num_complex::Complex64;

use crate::circuit::{UnknownId, UnknownRegistry};
use crate::error::{NodalError, Result};
use crate::integration::IntegrationMethod;
use crate::simulation::SimulationState;
use crate::solver::Solver;

/// Contribution to the real-valued system (DC and transient).
pub trait Loadable {
    /// Unique instance name.
    fn name(&self) -> &str;

    /// Pin names, in connection order.
    fn pins(&self) -> &'static [&'static str];

    /// Record the unknowns the pins are wired to.
    fn connect(&mut self, pins: &[UnknownId]) -> Result<()>;

    /// Unknowns the device is wired to, including any it created.
    fn connections(&self) -> Vec<UnknownId>;

    /// Register branch currents or internal nodes.
    fn setup(&mut self, _unknowns: &mut UnknownRegistry) -> Result<()> {
        Ok(())
    }

    /// Request matrix and right-hand side handles.
    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()>;

    /// Stamp the linearization at `state.solution`.
    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()>;

    /// Whether the device's own linearization point has settled.
    fn is_convergent(&self, _state: &SimulationState) -> bool {
        true
    }

    fn is_nonlinear(&self) -> bool {
        false
    }
}

/// Parameters that depend on the circuit temperature.
pub trait TemperatureDependent {
    fn temperature(&mut self, state: &SimulationState) -> Result<()>;
}

/// Devices with differential state.
pub trait TimeIntegrable {
    /// Allocate integration states.
    fn create_states(&mut self, method: &mut IntegrationMethod);

    /// Write initial state values from the operating point.
    fn initialize_states(&mut self, state: &SimulationState, method: &mut IntegrationMethod);

    /// Stamp the companion model of the present timepoint.
    fn load_transient(
        &mut self,
        solver: &mut Solver<f64>,
        state: &mut SimulationState,
        method: &mut IntegrationMethod,
    ) -> Result<()>;
}

/// Context of a small-signal load.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyContext<'a> {
    /// Laplace variable, `jω` for a sinusoidal steady state
    pub laplace: Complex64,
    /// Operating point the devices are linearized at
    pub state: &'a SimulationState,
}

impl FrequencyContext<'_> {
    /// Angular frequency.
    pub fn omega(&self) -> f64 {
        self.laplace.im
    }
}

/// Contribution to the complex small-signal system.
pub trait FrequencyLoadable {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()>;

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        context: &FrequencyContext<'_>,
    ) -> Result<()>;
}

/// A device model: a [`Loadable`] plus the optional capabilities.
pub trait Device: Loadable {
    fn as_temperature_dependent(&mut self) -> Option<&mut dyn TemperatureDependent> {
        None
    }

    fn as_time_integrable(&mut self) -> Option<&mut dyn TimeIntegrable> {
        None
    }

    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        None
    }
}

/// Copy `pins` into `slots` after checking the count.
pub fn connect_pins(name: &str, slots: &mut [UnknownId], pins: &[UnknownId]) -> Result<()> {
    if slots.len() != pins.len() {
        return Err(NodalError::pin_count(name, slots.len(), pins.len()));
    }
    slots.copy_from_slice(pins);
    Ok(())
}
