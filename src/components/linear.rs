//! Linear passive components: Resistor, Capacitor, Inductor.

use num_complex::Complex64;

use crate::behaviors::{
    connect_pins, BranchStamp, ConductanceStamp, CurrentStamp, Device, FrequencyContext,
    FrequencyLoadable, Loadable, TemperatureDependent, TimeIntegrable,
};
use crate::circuit::{UnknownId, UnknownKind, UnknownRegistry};
use crate::error::{NodalError, Result};
use crate::integration::{IntegrationMethod, StateDerivative};
use crate::simulation::SimulationState;
use crate::solver::Solver;

const TWO_PINS: &[&str] = &["pos", "neg"];

/// Smallest resistance accepted before the conductance blows up.
const MIN_RESISTANCE: f64 = 1e-12;

/// A resistor with optional temperature coefficients.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub nodes: [UnknownId; 2],
    /// Resistance at the nominal temperature
    pub resistance: f64,
    /// First-order temperature coefficient (1/K)
    pub tc1: f64,
    /// Second-order temperature coefficient (1/K²)
    pub tc2: f64,
    conductance: f64,
    stamp: ConductanceStamp,
    ac_stamp: ConductanceStamp,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: impl Into<String>, resistance: f64) -> Result<Self> {
        let name = name.into();
        if !resistance.is_finite() || resistance.abs() < MIN_RESISTANCE {
            return Err(NodalError::invalid_argument(format!(
                "resistor '{name}' needs a nonzero resistance, got {resistance}"
            )));
        }
        Ok(Self {
            name,
            nodes: [UnknownId::GROUND; 2],
            resistance,
            tc1: 0.0,
            tc2: 0.0,
            conductance: 1.0 / resistance,
            stamp: ConductanceStamp::default(),
            ac_stamp: ConductanceStamp::default(),
        })
    }

    pub fn with_temperature_coefficients(mut self, tc1: f64, tc2: f64) -> Self {
        self.tc1 = tc1;
        self.tc2 = tc2;
        self
    }

    /// Conductance at the present temperature.
    pub fn conductance(&self) -> f64 {
        self.conductance
    }
}

impl Loadable for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        TWO_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        self.nodes.to_vec()
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        self.stamp = ConductanceStamp::bind(solver, self.nodes[0], self.nodes[1])?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
        self.stamp.stamp(solver, self.conductance);
        Ok(())
    }
}

impl TemperatureDependent for Resistor {
    fn temperature(&mut self, state: &SimulationState) -> Result<()> {
        let dt = state.temperature - state.nominal_temperature;
        let factor = 1.0 + self.tc1 * dt + self.tc2 * dt * dt;
        let resistance = self.resistance * factor;
        if resistance.abs() < MIN_RESISTANCE {
            return Err(NodalError::invalid_argument(format!(
                "resistor '{}' vanishes at {} K",
                self.name, state.temperature
            )));
        }
        self.conductance = 1.0 / resistance;
        Ok(())
    }
}

impl FrequencyLoadable for Resistor {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        self.ac_stamp = ConductanceStamp::bind(solver, self.nodes[0], self.nodes[1])?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp.stamp(solver, Complex64::new(self.conductance, 0.0));
        Ok(())
    }
}

impl Device for Resistor {
    fn as_temperature_dependent(&mut self) -> Option<&mut dyn TemperatureDependent> {
        Some(self)
    }

    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}

/// A capacitor.
///
/// Open in DC. In transient analysis the charge q = C·v is integrated and
/// the capacitor becomes a conductance in parallel with a current source:
///   i = geq·v + ceq
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub nodes: [UnknownId; 2],
    pub capacitance: f64,
    charge: Option<StateDerivative>,
    stamp: ConductanceStamp,
    current: CurrentStamp,
    ac_stamp: ConductanceStamp,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(name: impl Into<String>, capacitance: f64) -> Result<Self> {
        let name = name.into();
        if !capacitance.is_finite() || capacitance < 0.0 {
            return Err(NodalError::invalid_argument(format!(
                "capacitor '{name}' needs a non-negative capacitance, got {capacitance}"
            )));
        }
        Ok(Self {
            name,
            nodes: [UnknownId::GROUND; 2],
            capacitance,
            charge: None,
            stamp: ConductanceStamp::default(),
            current: CurrentStamp::default(),
            ac_stamp: ConductanceStamp::default(),
        })
    }

    /// Present current through the capacitor, from pos to neg.
    pub fn current(&self, method: &IntegrationMethod) -> f64 {
        self.charge.map_or(0.0, |q| method.derivative(q))
    }
}

impl Loadable for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        TWO_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        self.nodes.to_vec()
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [pos, neg] = self.nodes;
        self.stamp = ConductanceStamp::bind(solver, pos, neg)?;
        self.current = CurrentStamp::bind(solver, pos, neg)?;
        Ok(())
    }

    fn load(&mut self, _solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
        Ok(())
    }
}

impl TimeIntegrable for Capacitor {
    fn create_states(&mut self, method: &mut IntegrationMethod) {
        self.charge = Some(method.create_derivative(true));
    }

    fn initialize_states(&mut self, state: &SimulationState, method: &mut IntegrationMethod) {
        if let Some(q) = self.charge {
            let v = state.difference(self.nodes[0].index(), self.nodes[1].index());
            method.set_value(q, self.capacitance * v);
        }
    }

    fn load_transient(
        &mut self,
        solver: &mut Solver<f64>,
        state: &mut SimulationState,
        method: &mut IntegrationMethod,
    ) -> Result<()> {
        let Some(q) = self.charge else {
            return Ok(());
        };
        let v = state.difference(self.nodes[0].index(), self.nodes[1].index());
        method.set_value(q, self.capacitance * v);
        method.integrate(q);
        let (geq, ceq) = method.companion(q, self.capacitance);
        self.stamp.stamp(solver, geq);
        self.current.stamp(solver, ceq);
        Ok(())
    }
}

impl FrequencyLoadable for Capacitor {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        self.ac_stamp = ConductanceStamp::bind(solver, self.nodes[0], self.nodes[1])?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp.stamp(solver, context.laplace * self.capacitance);
        Ok(())
    }
}

impl Device for Capacitor {
    fn as_time_integrable(&mut self) -> Option<&mut dyn TimeIntegrable> {
        Some(self)
    }

    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}

/// An inductor.
///
/// Adds a branch current unknown. Short in DC; in transient analysis the
/// flux φ = L·i is integrated and the branch equation becomes
///   v(pos) - v(neg) - geq·i = ceq
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub nodes: [UnknownId; 2],
    pub inductance: f64,
    pub branch: UnknownId,
    flux: Option<StateDerivative>,
    stamp: BranchStamp,
    ac_stamp: BranchStamp,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(name: impl Into<String>, inductance: f64) -> Result<Self> {
        let name = name.into();
        if !inductance.is_finite() || inductance < 0.0 {
            return Err(NodalError::invalid_argument(format!(
                "inductor '{name}' needs a non-negative inductance, got {inductance}"
            )));
        }
        Ok(Self {
            name,
            nodes: [UnknownId::GROUND; 2],
            inductance,
            branch: UnknownId::GROUND,
            flux: None,
            stamp: BranchStamp::default(),
            ac_stamp: BranchStamp::default(),
        })
    }
}

impl Loadable for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        TWO_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        vec![self.nodes[0], self.nodes[1], self.branch]
    }

    fn setup(&mut self, unknowns: &mut UnknownRegistry) -> Result<()> {
        self.branch = unknowns.create(&format!("{}#branch", self.name), UnknownKind::Current)?;
        Ok(())
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [pos, neg] = self.nodes;
        self.stamp = BranchStamp::bind(solver, pos, neg, self.branch, true)?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
        self.stamp.stamp_incidence(solver);
        Ok(())
    }
}

impl TimeIntegrable for Inductor {
    fn create_states(&mut self, method: &mut IntegrationMethod) {
        self.flux = Some(method.create_derivative(true));
    }

    fn initialize_states(&mut self, state: &SimulationState, method: &mut IntegrationMethod) {
        if let Some(flux) = self.flux {
            method.set_value(flux, self.inductance * state.solution[self.branch.index()]);
        }
    }

    fn load_transient(
        &mut self,
        solver: &mut Solver<f64>,
        state: &mut SimulationState,
        method: &mut IntegrationMethod,
    ) -> Result<()> {
        let Some(flux) = self.flux else {
            return Ok(());
        };
        method.set_value(flux, self.inductance * state.solution[self.branch.index()]);
        method.integrate(flux);
        let (geq, ceq) = method.companion(flux, self.inductance);
        self.stamp.stamp_impedance(solver, geq);
        self.stamp.stamp_rhs(solver, ceq);
        Ok(())
    }
}

impl FrequencyLoadable for Inductor {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        let [pos, neg] = self.nodes;
        self.ac_stamp = BranchStamp::bind(solver, pos, neg, self.branch, true)?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp.stamp_incidence(solver);
        self.ac_stamp
            .stamp_impedance(solver, context.laplace * self.inductance);
        Ok(())
    }
}

impl Device for Inductor {
    fn as_time_integrable(&mut self) -> Option<&mut dyn TimeIntegrable> {
        Some(self)
    }

    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}
