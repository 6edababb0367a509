//! Main simulator interface.

use num_complex::Complex64;

use crate::circuit::{validate_circuit, Circuit, UnknownId};
use crate::error::{NodalError, Result};
use crate::solver::{Markowitz, NewtonRaphson, Solver};

use super::load::CircuitLoad;
use super::{BaseConfiguration, SimulationState};

/// The main circuit simulator.
///
/// Owns the circuit, the real-valued solver and the simulation context.
/// [`setup`](Self::setup) runs implicitly before the first analysis:
/// devices register their unknowns, the temperature pass runs and every
/// device binds its matrix handles.
pub struct Simulator {
    /// The circuit being simulated
    pub(super) circuit: Circuit,
    pub(super) config: BaseConfiguration,
    /// Real-valued system for DC and transient analysis
    pub(super) solver: Solver<f64>,
    /// Complex system for small-signal analysis, bound on first use
    pub(super) ac_solver: Option<Solver<Complex64>>,
    pub(super) state: SimulationState,
    /// Newton-Raphson controller for operating points
    pub(super) newton: NewtonRaphson,
    pub(super) is_setup: bool,
    /// Whether `state` holds a converged operating point
    pub(super) has_operating_point: bool,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Self {
        Self::with_config(circuit, BaseConfiguration::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: BaseConfiguration) -> Self {
        let newton = NewtonRaphson::new()
            .with_max_iterations(config.dc_max_iterations)
            .with_tolerances(
                config.relative_tolerance,
                config.absolute_tolerance,
                config.voltage_tolerance,
            );
        let strategy = Markowitz::new().with_thresholds(
            config.relative_pivot_threshold,
            config.absolute_pivot_threshold,
        );
        let state = SimulationState::new(0, &config);
        Self {
            circuit,
            config,
            solver: Solver::with_strategy(strategy),
            ac_solver: None,
            state,
            newton,
            is_setup: false,
            has_operating_point: false,
        }
    }

    /// Prepare the circuit for analysis. Runs once.
    pub fn setup(&mut self) -> Result<()> {
        if self.is_setup {
            return Ok(());
        }
        self.config.validate()?;
        self.circuit.setup()?;
        let size = self.circuit.size();
        self.state = SimulationState::new(size, &self.config);
        validate_circuit(&self.circuit, &mut self.state.diagnostics)?;

        for device in self.circuit.devices_mut() {
            if let Some(dependent) = device.as_temperature_dependent() {
                dependent.temperature(&self.state)?;
            }
        }

        self.solver.expand(size);
        for device in self.circuit.devices_mut() {
            device.bind(&mut self.solver)?;
        }
        self.solver.fix_size();

        self.is_setup = true;
        log::info!(
            "Simulator ready: {} devices, {} unknowns, {} matrix elements",
            self.circuit.len(),
            size,
            self.solver.matrix().element_count()
        );
        Ok(())
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn config(&self) -> &BaseConfiguration {
        &self.config
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn solver(&self) -> &Solver<f64> {
        &self.solver
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[String] {
        self.state.diagnostics.warnings()
    }

    /// Present solution, indexed by unknown.
    pub fn solution(&self) -> &[f64] {
        &self.state.solution
    }

    /// Value of the unknown named `name` in the present solution.
    pub fn value(&self, name: &str) -> Result<f64> {
        let id = self.circuit.unknown(name)?;
        self.value_of(id)
    }

    /// Value of unknown `id` in the present solution.
    pub fn value_of(&self, id: UnknownId) -> Result<f64> {
        self.state
            .solution
            .get(id.index())
            .copied()
            .ok_or_else(|| NodalError::out_of_range(id.index(), self.state.size()))
    }

    /// Solve the circuit once with the present context.
    pub(super) fn iterate(&mut self, newton: &NewtonRaphson) -> Result<usize> {
        let (unknowns, devices) = self.circuit.parts_mut();
        let mut system = CircuitLoad::new(unknowns, devices);
        newton.solve(&mut system, &mut self.solver, &mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Resistor, VoltageSource};

    #[test]
    fn test_setup_binds_every_device() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", 1.0), &["in", "0"]).unwrap();
        circuit.add(Resistor::new("R1", 1e3).unwrap(), &["in", "0"]).unwrap();
        let mut sim = Simulator::new(circuit);
        sim.setup().unwrap();
        assert_eq!(sim.solver().size(), 2);
        assert_eq!(sim.state().size(), 2);
        // R1 diagonal plus the source's two incidence entries
        assert_eq!(sim.solver().matrix().element_count(), 3);
    }

    #[test]
    fn test_invalid_config_is_reported_at_setup() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", 1e3).unwrap(), &["a", "0"]).unwrap();
        let config = BaseConfiguration::default().with_gmin(-1.0);
        let mut sim = Simulator::with_config(circuit, config);
        assert!(matches!(
            sim.setup(),
            Err(NodalError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_empty_circuit_is_rejected() {
        let mut sim = Simulator::new(Circuit::new());
        assert!(matches!(sim.setup(), Err(NodalError::InvalidTopology { .. })));
    }
}
