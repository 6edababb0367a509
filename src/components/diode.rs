//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt))
//!
//! Junction voltage updates are limited logarithmically above the critical
//! voltage, and an optional series resistance adds an internal node.

use num_complex::Complex64;

use crate::behaviors::{
    connect_pins, ConductanceStamp, CurrentStamp, Device, FrequencyContext, FrequencyLoadable,
    Loadable, TemperatureDependent,
};
use crate::circuit::{UnknownId, UnknownKind, UnknownRegistry};
use crate::error::{NodalError, Result};
use crate::simulation::SimulationState;
use crate::solver::{InitMode, Solver};
use crate::{BOLTZMANN, CHARGE};

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
    /// Series resistance (Ω); 0 for none
    pub rs: f64,
    /// Bandgap energy (eV)
    pub eg: f64,
    /// Saturation current temperature exponent
    pub xti: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            rs: 0.0,
            eg: 1.11,
            xti: 3.0,
        }
    }
}

impl DiodeParams {
    pub fn with_series_resistance(mut self, rs: f64) -> Self {
        self.rs = rs;
        self
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    /// [anode, cathode]
    pub nodes: [UnknownId; 2],
    pub params: DiodeParams,
    /// Anode side of the junction; the anode itself without series resistance
    internal: UnknownId,
    /// n·Vt at the present temperature
    n_vt: f64,
    /// Saturation current at the present temperature
    is_t: f64,
    /// Critical voltage above which updates are limited
    v_crit: f64,
    /// Linearization point
    v_op: f64,
    i_op: f64,
    g_op: f64,
    junction: ConductanceStamp,
    junction_current: CurrentStamp,
    series: ConductanceStamp,
    ac_junction: ConductanceStamp,
    ac_series: ConductanceStamp,
}

impl Diode {
    /// Create a new diode.
    pub fn new(name: impl Into<String>, params: DiodeParams) -> Result<Self> {
        let name = name.into();
        if !(params.is > 0.0) || !(params.n > 0.0) || params.rs < 0.0 {
            return Err(NodalError::invalid_argument(format!(
                "diode '{name}' needs positive Is and n and a non-negative Rs"
            )));
        }
        let mut diode = Self {
            name,
            nodes: [UnknownId::GROUND; 2],
            params,
            internal: UnknownId::GROUND,
            n_vt: 0.0,
            is_t: 0.0,
            v_crit: 0.0,
            v_op: 0.0,
            i_op: 0.0,
            g_op: 0.0,
            junction: ConductanceStamp::default(),
            junction_current: CurrentStamp::default(),
            series: ConductanceStamp::default(),
            ac_junction: ConductanceStamp::default(),
            ac_series: ConductanceStamp::default(),
        };
        diode.update_temperature(crate::REFERENCE_TEMPERATURE, crate::REFERENCE_TEMPERATURE);
        Ok(diode)
    }

    fn update_temperature(&mut self, temperature: f64, nominal: f64) {
        let vt = BOLTZMANN * temperature / CHARGE;
        let n_vt = self.params.n * vt;
        let ratio = temperature / nominal;
        self.is_t = self.params.is
            * ratio.powf(self.params.xti / self.params.n)
            * ((ratio - 1.0) * self.params.eg / n_vt).exp();
        self.n_vt = n_vt;
        self.v_crit = n_vt * (n_vt / (std::f64::consts::SQRT_2 * self.is_t)).ln();
    }

    /// Junction current and conductance at `v`, without gmin.
    pub fn evaluate(&self, v: f64) -> (f64, f64) {
        if v >= -3.0 * self.n_vt {
            let e = (v / self.n_vt).exp();
            (self.is_t * (e - 1.0), self.is_t * e / self.n_vt)
        } else {
            // Reverse bias: smooth approach to -Is
            let a = 3.0 * self.n_vt / (v * std::f64::consts::E);
            let a = a * a * a;
            (-self.is_t * (1.0 + a), self.is_t * 3.0 * a / v)
        }
    }

    /// Critical voltage at the present temperature.
    pub fn critical_voltage(&self) -> f64 {
        self.v_crit
    }

    /// Linearization point: junction voltage, current, conductance.
    pub fn operating_point(&self) -> (f64, f64, f64) {
        (self.v_op, self.i_op, self.g_op)
    }
}

/// Limit a junction voltage update (logarithmic above `v_crit`).
///
/// Returns the limited voltage and whether limiting was applied.
pub fn limit_junction(v_new: f64, v_old: f64, n_vt: f64, v_crit: f64) -> (f64, bool) {
    if v_new > v_crit && (v_new - v_old).abs() > 2.0 * n_vt {
        let limited = if v_old > 0.0 {
            let arg = 1.0 + (v_new - v_old) / n_vt;
            if arg > 0.0 {
                v_old + n_vt * arg.ln()
            } else {
                v_crit
            }
        } else {
            n_vt * (v_new / n_vt).ln()
        };
        (limited, true)
    } else {
        (v_new, false)
    }
}

impl Loadable for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        &["anode", "cathode"]
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)?;
        self.internal = self.nodes[0];
        Ok(())
    }

    fn connections(&self) -> Vec<UnknownId> {
        let mut connections = self.nodes.to_vec();
        if self.internal != self.nodes[0] {
            connections.push(self.internal);
        }
        connections
    }

    fn setup(&mut self, unknowns: &mut UnknownRegistry) -> Result<()> {
        self.internal = if self.params.rs > 0.0 {
            unknowns.create(&format!("{}#internal", self.name), UnknownKind::Voltage)?
        } else {
            self.nodes[0]
        };
        Ok(())
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [anode, cathode] = self.nodes;
        self.junction = ConductanceStamp::bind(solver, self.internal, cathode)?;
        self.junction_current = CurrentStamp::bind(solver, self.internal, cathode)?;
        if self.internal != anode {
            self.series = ConductanceStamp::bind(solver, anode, self.internal)?;
        }
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
        let v = match state.init {
            InitMode::Junction => self.v_crit,
            _ => {
                let v = state.difference(self.internal.index(), self.nodes[1].index());
                let (limited, was_limited) = limit_junction(v, self.v_op, self.n_vt, self.v_crit);
                if was_limited {
                    state.is_convergent = false;
                }
                limited
            }
        };

        let (i, g) = self.evaluate(v);
        let g = g + state.gmin;
        let i = i + state.gmin * v;
        self.v_op = v;
        self.i_op = i;
        self.g_op = g;

        self.junction.stamp(solver, g);
        self.junction_current.stamp(solver, i - g * v);
        if self.internal != self.nodes[0] {
            self.series.stamp(solver, 1.0 / self.params.rs);
        }
        Ok(())
    }

    fn is_convergent(&self, state: &SimulationState) -> bool {
        let v = state.difference(self.internal.index(), self.nodes[1].index());
        let predicted = self.i_op + self.g_op * (v - self.v_op);
        let (i, _) = self.evaluate(v);
        let i = i + state.gmin * v;
        let tolerance =
            state.relative_tolerance * predicted.abs().max(i.abs()) + state.absolute_tolerance;
        (predicted - i).abs() <= tolerance
    }

    fn is_nonlinear(&self) -> bool {
        true
    }
}

impl TemperatureDependent for Diode {
    fn temperature(&mut self, state: &SimulationState) -> Result<()> {
        self.update_temperature(state.temperature, state.nominal_temperature);
        Ok(())
    }
}

impl FrequencyLoadable for Diode {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        let [anode, cathode] = self.nodes;
        self.ac_junction = ConductanceStamp::bind(solver, self.internal, cathode)?;
        if self.internal != anode {
            self.ac_series = ConductanceStamp::bind(solver, anode, self.internal)?;
        }
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_junction.stamp(solver, Complex64::new(self.g_op, 0.0));
        if self.internal != self.nodes[0] {
            self.ac_series
                .stamp(solver, Complex64::new(1.0 / self.params.rs, 0.0));
        }
        Ok(())
    }
}

impl Device for Diode {
    fn as_temperature_dependent(&mut self) -> Option<&mut dyn TemperatureDependent> {
        Some(self)
    }

    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}
