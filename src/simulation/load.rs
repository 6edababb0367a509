//! Adapter presenting a circuit's devices to the Newton-Raphson controller.

use crate::behaviors::Device;
use crate::circuit::{UnknownKind, UnknownRegistry};
use crate::error::Result;
use crate::integration::IntegrationMethod;
use crate::solver::{NonlinearSystem, Solver};

use super::SimulationState;

/// The devices of a circuit as one [`NonlinearSystem`].
///
/// With an integration method attached and `use_dc` cleared, time-integrable
/// devices also stamp their companion models.
pub(crate) struct CircuitLoad<'a> {
    unknowns: &'a UnknownRegistry,
    devices: &'a mut [Box<dyn Device>],
    method: Option<&'a mut IntegrationMethod>,
    is_nonlinear: bool,
}

impl<'a> CircuitLoad<'a> {
    pub(crate) fn new(unknowns: &'a UnknownRegistry, devices: &'a mut [Box<dyn Device>]) -> Self {
        let is_nonlinear = devices.iter().any(|d| d.is_nonlinear());
        Self {
            unknowns,
            devices,
            method: None,
            is_nonlinear,
        }
    }

    /// Attach the integration method of a transient analysis.
    ///
    /// Integration states are only recomputed from the final iterate when
    /// the controller iterates, so any time-integrable device makes the
    /// system count as nonlinear.
    pub(crate) fn with_method(mut self, method: &'a mut IntegrationMethod) -> Self {
        if self
            .devices
            .iter_mut()
            .any(|d| d.as_time_integrable().is_some())
        {
            self.is_nonlinear = true;
        }
        self.method = Some(method);
        self
    }
}

impl NonlinearSystem for CircuitLoad<'_> {
    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
        for device in self.devices.iter_mut() {
            device.load(solver, state)?;
            if state.use_dc {
                continue;
            }
            if let Some(method) = self.method.as_deref_mut() {
                if let Some(integrable) = device.as_time_integrable() {
                    integrable.load_transient(solver, state, method)?;
                }
            }
        }
        Ok(())
    }

    fn is_convergent(&self, state: &SimulationState) -> bool {
        self.devices.iter().all(|d| d.is_convergent(state))
    }

    fn is_nonlinear(&self) -> bool {
        self.is_nonlinear
    }

    fn kind(&self, index: usize) -> UnknownKind {
        self.unknowns.kind(index)
    }
}
