//! Small-signal frequency-domain analysis.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::behaviors::FrequencyContext;
use crate::error::{NodalError, Result};
use crate::solver::{Markowitz, Solver};

use super::Simulator;

impl Simulator {
    /// Solve the circuit linearized at its operating point for a
    /// sinusoidal excitation at `frequency` Hz.
    ///
    /// Runs the operating point first if none is available. Returns the
    /// complex solution indexed by unknown, ground at index 0.
    pub fn small_signal(&mut self, frequency: f64) -> Result<Vec<Complex64>> {
        if !(frequency >= 0.0 && frequency.is_finite()) {
            return Err(NodalError::invalid_param(format!(
                "frequency must be non-negative, got {frequency}"
            )));
        }
        if !self.has_operating_point {
            self.operating_point()?;
        }

        let mut solver = match self.ac_solver.take() {
            Some(solver) => solver,
            None => self.bind_frequency()?,
        };
        let result = self.solve_frequency(&mut solver, frequency);
        self.ac_solver = Some(solver);
        result
    }

    /// Small-signal solutions at each of `frequencies`.
    pub fn frequency_sweep(&mut self, frequencies: &[f64]) -> Result<Vec<Vec<Complex64>>> {
        log::info!("Small-signal sweep over {} frequencies", frequencies.len());
        frequencies
            .iter()
            .map(|&frequency| self.small_signal(frequency))
            .collect()
    }

    fn bind_frequency(&mut self) -> Result<Solver<Complex64>> {
        let strategy = Markowitz::new().with_thresholds(
            self.config.relative_pivot_threshold,
            self.config.absolute_pivot_threshold,
        );
        let mut solver = Solver::with_strategy(strategy);
        solver.expand(self.circuit.size());
        for device in self.circuit.devices_mut() {
            if let Some(loadable) = device.as_frequency_loadable() {
                loadable.bind_frequency(&mut solver)?;
            }
        }
        solver.fix_size();
        log::debug!(
            "Small-signal system bound: {} elements",
            solver.matrix().element_count()
        );
        Ok(solver)
    }

    fn solve_frequency(&mut self, solver: &mut Solver<Complex64>, frequency: f64) -> Result<Vec<Complex64>> {
        let context = FrequencyContext {
            laplace: Complex64::new(0.0, 2.0 * PI * frequency),
            state: &self.state,
        };
        solver.clear();
        for device in self.circuit.devices_mut() {
            if let Some(loadable) = device.as_frequency_loadable() {
                loadable.load_frequency(solver, &context)?;
            }
        }
        solver.preorder_mna()?;
        solver.order_and_factor()?;

        let mut solution = Vec::new();
        solver.solve(&mut solution)?;
        Ok(solution)
    }
}
