//! Transient analysis with truncation-error timestep control.

use crate::circuit::UnknownId;
use crate::error::{NodalError, Result};
use crate::integration::IntegrationMethod;
use crate::solver::{InitMode, NewtonRaphson};

use super::load::CircuitLoad;
use super::{Simulator, TimeConfiguration};

/// An accepted timepoint, handed to the transient callback.
#[derive(Debug, Clone, Copy)]
pub struct TimePoint<'a> {
    pub time: f64,
    /// Solution indexed by unknown, ground at index 0
    pub solution: &'a [f64],
}

impl TimePoint<'_> {
    /// Value of unknown `id`, zero when out of range.
    pub fn value(&self, id: UnknownId) -> f64 {
        self.solution.get(id.index()).copied().unwrap_or(0.0)
    }
}

/// Counters of a finished transient run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransientStats {
    /// Accepted timepoints, the initial point excluded
    pub accepted: usize,
    /// Points rejected by the truncation error check
    pub rejected: usize,
    /// Points whose Newton-Raphson iteration failed
    pub failed: usize,
    /// Newton-Raphson iterations over all timepoints
    pub iterations: usize,
}

impl Simulator {
    /// Run a transient analysis from the operating point at
    /// `config.initial_time` up to `config.final_time`.
    ///
    /// `callback` sees the initial point and every accepted timepoint, in
    /// increasing time order.
    pub fn transient<F>(&mut self, config: &TimeConfiguration, mut callback: F) -> Result<TransientStats>
    where
        F: FnMut(&TimePoint<'_>),
    {
        config.validate()?;
        self.setup()?;
        let mut method = config.build_method(&self.config)?;
        for device in self.circuit.devices_mut() {
            if let Some(integrable) = device.as_time_integrable() {
                integrable.create_states(&mut method);
            }
        }
        log::info!(
            "Transient analysis: {} to {}s, {} method, {} states",
            config.initial_time,
            config.final_time,
            method.kind(),
            method.state_count()
        );

        // Initial conditions
        self.state.use_dc = true;
        self.state.time = config.initial_time;
        let result = self.solve_operating_point();
        let mut stats = TransientStats {
            iterations: result?,
            ..TransientStats::default()
        };
        self.state.use_dc = false;
        // The state now follows the timepoints
        self.has_operating_point = false;

        let max_step = config.effective_max_step();
        method.initialize(config.initial_time, config.step, max_step);
        for device in self.circuit.devices_mut() {
            if let Some(integrable) = device.as_time_integrable() {
                integrable.initialize_states(&self.state, &mut method);
            }
        }
        method.initialize_history();
        callback(&TimePoint {
            time: config.initial_time,
            solution: &self.state.solution,
        });

        let newton = self
            .newton
            .clone()
            .with_max_iterations(config.transient_max_iterations);
        let span = config.final_time - config.initial_time;
        let min_delta = 1e-9 * max_step;
        let mut delta = ((span / 50.0).min(config.step) / 10.0).min(max_step);
        let mut accepted = self.state.solution.clone();

        loop {
            let remaining = config.final_time - method.base_time();
            if remaining <= min_delta {
                break;
            }
            delta = delta.min(remaining);
            method.probe(delta)?;
            self.state.time = method.time();
            self.state.init = InitMode::Transient;

            match self.iterate_transient(&newton, &mut method) {
                Ok(iterations) => {
                    stats.iterations += iterations;
                    let verdict = method.evaluate(max_step);
                    if verdict.accepted {
                        method.accept();
                        accepted.copy_from_slice(&self.state.solution);
                        stats.accepted += 1;
                        callback(&TimePoint {
                            time: method.base_time(),
                            solution: &self.state.solution,
                        });
                    } else {
                        stats.rejected += 1;
                        self.state.solution.copy_from_slice(&accepted);
                    }
                    delta = verdict.next_delta;
                }
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => {
                    log::warn!("Timepoint {:.6e} failed: {}", method.time(), e);
                    stats.failed += 1;
                    self.state.solution.copy_from_slice(&accepted);
                    delta /= 8.0;
                    method.restart_order();
                }
            }

            if delta < min_delta {
                let time = method.base_time();
                self.state
                    .diagnostics
                    .warn(format!("Timestep too small at {time:.6e}s"));
                return Err(NodalError::TimestepTooSmall { time, delta });
            }
        }

        log::info!(
            "Transient done: {} accepted, {} rejected, {} failed, {} iterations",
            stats.accepted,
            stats.rejected,
            stats.failed,
            stats.iterations
        );
        Ok(stats)
    }

    fn iterate_transient(
        &mut self,
        newton: &NewtonRaphson,
        method: &mut IntegrationMethod,
    ) -> Result<usize> {
        let (unknowns, devices) = self.circuit.parts_mut();
        let mut system = CircuitLoad::new(unknowns, devices).with_method(method);
        newton.solve(&mut system, &mut self.solver, &mut self.state)
    }
}
