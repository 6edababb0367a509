//! DC operating point with gmin and source stepping fallbacks.

use crate::error::Result;
use crate::solver::{InitMode, NewtonRaphson};

use super::Simulator;

impl Simulator {
    /// Find the DC operating point.
    ///
    /// Tries a direct Newton-Raphson solve first, then diagonal gmin
    /// stepping, then source stepping. Returns the total number of
    /// iterations; the solution is left in the simulation state.
    ///
    /// Sources are evaluated at time zero.
    pub fn operating_point(&mut self) -> Result<usize> {
        self.setup()?;
        log::info!("Operating point analysis");
        self.state.use_dc = true;
        self.state.time = 0.0;
        let result = self.solve_operating_point();
        self.has_operating_point = result.is_ok();
        if let Ok(iterations) = result {
            log::info!("Operating point found in {} iterations", iterations);
        }
        result
    }

    pub(super) fn solve_operating_point(&mut self) -> Result<usize> {
        let newton = self.newton.clone();
        self.state.source_factor = 1.0;
        self.state.diagonal_gmin = 0.0;
        self.state.init = InitMode::Junction;

        let mut last = match self.iterate(&newton) {
            Ok(iterations) => return Ok(iterations),
            Err(e) if e.is_structural() => return Err(e),
            Err(e) => e,
        };

        if self.config.gmin_steps > 0 {
            self.state
                .diagnostics
                .warn(format!("Direct operating point failed ({last}), trying gmin stepping"));
            let result = self.gmin_stepping(&newton);
            self.state.diagonal_gmin = 0.0;
            match result {
                Ok(iterations) => return Ok(iterations),
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => last = e,
            }
        }

        if self.config.source_steps > 0 {
            self.state
                .diagnostics
                .warn(format!("Gmin stepping failed ({last}), trying source stepping"));
            let result = self.source_stepping(&newton);
            self.state.source_factor = 1.0;
            match result {
                Ok(iterations) => return Ok(iterations),
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => last = e,
            }
        }

        Err(last)
    }

    /// Solve with a large conductance on every diagonal, lowering it a
    /// decade at a time, then once without.
    fn gmin_stepping(&mut self, newton: &NewtonRaphson) -> Result<usize> {
        let steps = self.config.gmin_steps;
        let mut gmin = self.config.gmin.max(f64::MIN_POSITIVE) * 10f64.powi(steps as i32);
        let mut total = 0;

        self.state.reset();
        self.state.init = InitMode::Junction;
        for _ in 0..=steps {
            self.state.diagonal_gmin = gmin;
            total += self.iterate(newton)?;
            log::debug!("Gmin step {:.1e} converged", gmin);
            gmin /= 10.0;
            self.state.init = InitMode::Float;
        }

        self.state.diagonal_gmin = 0.0;
        total += self.iterate(newton)?;
        Ok(total)
    }

    /// Ramp every independent source from zero to its full value.
    fn source_stepping(&mut self, newton: &NewtonRaphson) -> Result<usize> {
        let steps = self.config.source_steps;
        let mut total = 0;

        self.state.reset();
        self.state.init = InitMode::Junction;
        for step in 0..=steps {
            let factor = step as f64 / steps as f64;
            self.state.source_factor = factor;
            total += self.iterate(newton).map_err(|e| {
                log::debug!("Source step {:.2} failed: {}", factor, e);
                e
            })?;
            self.state.init = InitMode::Float;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::{connect_pins, ConductanceStamp, CurrentStamp, Device, Loadable};
    use crate::circuit::{Circuit, UnknownId};
    use crate::components::{Diode, DiodeParams, Resistor, VoltageSource};
    use crate::simulation::{BaseConfiguration, SimulationState};
    use crate::solver::Solver;
    use approx::assert_abs_diff_eq;

    fn diode_circuit() -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", 5.0), &["in", "0"]).unwrap();
        circuit.add(Resistor::new("R1", 1e3).unwrap(), &["in", "a"]).unwrap();
        circuit
            .add(Diode::new("D1", DiodeParams::default()).unwrap(), &["a", "0"])
            .unwrap();
        circuit
    }

    #[test]
    fn test_diode_operating_point() {
        let mut sim = Simulator::new(diode_circuit());
        let iterations = sim.operating_point().unwrap();
        assert!(iterations > 1);
        let va = sim.value("a").unwrap();
        assert!(va > 0.6 && va < 0.8, "diode voltage {va}");
        // KCL: resistor current matches the diode equation
        let i = (5.0 - va) / 1e3;
        let vt = crate::BOLTZMANN * crate::REFERENCE_TEMPERATURE / crate::CHARGE;
        let expected = 1e-14 * ((va / vt).exp() - 1.0);
        assert_abs_diff_eq!(i, expected, epsilon = 1e-2 * i);
        // Source current flows into the positive terminal
        assert_abs_diff_eq!(sim.value("V1#branch").unwrap(), -i, epsilon = 1e-9);
    }

    #[test]
    fn test_source_stepping_fallback() {
        // Direct solve gets two iterations, gmin stepping is off
        let config = BaseConfiguration::default()
            .with_dc_max_iterations(2)
            .with_stepping(0, 50);
        let mut sim = Simulator::with_config(diode_circuit(), config);
        let result = sim.operating_point();
        // Either source stepping succeeds or it reports a recoverable failure
        match result {
            Ok(_) => {
                let va = sim.value("a").unwrap();
                assert!(va > 0.6 && va < 0.8);
                assert!(!sim.warnings().is_empty());
            }
            Err(e) => assert!(!e.is_structural()),
        }
    }

    /// Draws `(v - 0.3)^2 + 1` from its node: no real operating point.
    struct NoRoot {
        nodes: [UnknownId; 1],
        conductance: ConductanceStamp,
        current: CurrentStamp,
    }

    impl Loadable for NoRoot {
        fn name(&self) -> &str {
            "X1"
        }

        fn pins(&self) -> &'static [&'static str] {
            &["node"]
        }

        fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
            connect_pins("X1", &mut self.nodes, pins)
        }

        fn connections(&self) -> Vec<UnknownId> {
            self.nodes.to_vec()
        }

        fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
            self.conductance = ConductanceStamp::bind(solver, self.nodes[0], UnknownId::GROUND)?;
            self.current = CurrentStamp::bind(solver, self.nodes[0], UnknownId::GROUND)?;
            Ok(())
        }

        fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
            let v = state.solution[self.nodes[0].index()];
            let i = (v - 0.3).powi(2) + 1.0;
            let g = 2.0 * (v - 0.3);
            self.conductance.stamp(solver, g);
            self.current.stamp(solver, i - g * v);
            Ok(())
        }

        fn is_nonlinear(&self) -> bool {
            true
        }
    }

    impl Device for NoRoot {}

    #[test]
    fn test_failure_is_reported() {
        let config = BaseConfiguration::default()
            .with_dc_max_iterations(20)
            .with_stepping(2, 2);
        let mut circuit = Circuit::new();
        let device = NoRoot {
            nodes: [UnknownId::GROUND],
            conductance: ConductanceStamp::default(),
            current: CurrentStamp::default(),
        };
        circuit.add(device, &["a"]).unwrap();
        let mut sim = Simulator::with_config(circuit, config);
        let err = sim.operating_point().unwrap_err();
        assert!(!err.is_structural(), "{err}");
        assert!(!sim.state().diagnostics.is_empty());
        assert!(!sim.has_operating_point);
    }
}
