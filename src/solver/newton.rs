//! Newton-Raphson iteration for nonlinear circuits.
//!
//! Each iteration asks the system to stamp its linearization at the present
//! solution, factors and solves, then compares the new solution with the
//! previous one. Devices may veto convergence through their own check.

use crate::circuit::UnknownKind;
use crate::error::{NodalError, Result};
use crate::simulation::SimulationState;

use super::mna::Solver;
use super::{DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_RELATIVE_TOLERANCE, DEFAULT_VOLTAGE_TOLERANCE};

/// Initialization mode of an iteration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMode {
    /// Plain iteration from the present solution.
    #[default]
    None,
    /// Junctions start from their critical voltage.
    Junction,
    /// Junction states are held while the rest of the circuit settles.
    Fix,
    /// All devices follow the solution freely.
    Float,
    /// First iteration of a new timepoint.
    Transient,
}

/// Anything the controller can drive to a fixed point.
pub trait NonlinearSystem {
    /// Stamp every contribution, linearized at `state.solution`.
    ///
    /// The matrix and right-hand side are cleared beforehand. A contributor
    /// that limited its own update clears `state.is_convergent`.
    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()>;

    /// Local convergence check of every contributor.
    fn is_convergent(&self, state: &SimulationState) -> bool;

    /// Whether any contributor is nonlinear.
    fn is_nonlinear(&self) -> bool;

    /// Kind of unknown `index`, which selects its absolute tolerance.
    fn kind(&self, index: usize) -> UnknownKind;
}

/// Newton-Raphson controller.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Relative tolerance on every unknown
    pub relative_tolerance: f64,
    /// Absolute tolerance on branch currents
    pub absolute_tolerance: f64,
    /// Absolute tolerance on node voltages
    pub voltage_tolerance: f64,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new()
    }
}

impl NewtonRaphson {
    /// Create a new Newton-Raphson solver.
    pub fn new() -> Self {
        Self {
            max_iterations: super::MAX_ITERATIONS,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            voltage_tolerance: DEFAULT_VOLTAGE_TOLERANCE,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerances(mut self, relative: f64, absolute: f64, voltage: f64) -> Self {
        self.relative_tolerance = relative;
        self.absolute_tolerance = absolute;
        self.voltage_tolerance = voltage;
        self
    }

    /// Iterate until the system converges.
    ///
    /// Returns the number of iterations used. A system without nonlinear
    /// contributors is solved in a single pass.
    pub fn solve<S: NonlinearSystem + ?Sized>(
        &self,
        system: &mut S,
        solver: &mut Solver<f64>,
        state: &mut SimulationState,
    ) -> Result<usize> {
        if !system.is_nonlinear() {
            return self.solve_linear(system, solver, state);
        }

        let mut iteration = 0;
        loop {
            load(system, solver, state)?;
            iteration += 1;

            solver.preorder_mna()?;
            if matches!(state.init, InitMode::Junction | InitMode::Transient) {
                solver.set_needs_reordering();
            }

            if solver.needs_reordering() {
                solver.order_and_factor()?;
            } else if !solver.factor() {
                log::debug!("Factorization failed at iteration {}, reloading", iteration);
                continue;
            }

            std::mem::swap(&mut state.solution, &mut state.old_solution);
            solver.solve(&mut state.solution)?;
            check_finite(&state.solution)?;

            if iteration > self.max_iterations {
                log::debug!("Newton-Raphson gave up after {} iterations", self.max_iterations);
                return Err(NodalError::convergence_failure(self.max_iterations));
            }

            state.is_convergent = if state.is_convergent && iteration != 1 {
                self.is_convergent(system, state)
            } else {
                false
            };

            match state.init {
                InitMode::None | InitMode::Float => {
                    if state.is_convergent {
                        log::trace!("Converged in {} iterations", iteration);
                        return Ok(iteration);
                    }
                }
                InitMode::Junction => {
                    state.init = InitMode::Fix;
                }
                InitMode::Fix => {
                    if state.is_convergent {
                        state.init = InitMode::Float;
                    }
                }
                InitMode::Transient => {
                    state.init = InitMode::Float;
                }
            }
        }
    }

    /// Single Load-Factor-Solve pass for purely linear systems.
    fn solve_linear<S: NonlinearSystem + ?Sized>(
        &self,
        system: &mut S,
        solver: &mut Solver<f64>,
        state: &mut SimulationState,
    ) -> Result<usize> {
        load(system, solver, state)?;
        solver.preorder_mna()?;
        if solver.needs_reordering() {
            solver.order_and_factor()?;
        } else if !solver.factor() {
            load(system, solver, state)?;
            solver.order_and_factor()?;
        }

        std::mem::swap(&mut state.solution, &mut state.old_solution);
        solver.solve(&mut state.solution)?;
        check_finite(&state.solution)?;

        state.is_convergent = true;
        if state.init != InitMode::None {
            state.init = InitMode::Float;
        }
        Ok(1)
    }

    /// Compare the new solution against the previous one, then ask the
    /// contributors.
    pub fn is_convergent<S: NonlinearSystem + ?Sized>(
        &self,
        system: &S,
        state: &SimulationState,
    ) -> bool {
        let pairs = state.solution.iter().zip(state.old_solution.iter());
        for (index, (&new, &old)) in pairs.enumerate().skip(1) {
            let floor = match system.kind(index) {
                UnknownKind::Voltage => self.voltage_tolerance,
                UnknownKind::Current => self.absolute_tolerance,
            };
            let tolerance = self.relative_tolerance * new.abs().max(old.abs()) + floor;
            if (new - old).abs() > tolerance {
                log::trace!(
                    "Unknown {} not converged: {:.6e} -> {:.6e}",
                    index,
                    old,
                    new
                );
                return false;
            }
        }
        system.is_convergent(state)
    }
}

/// Clear the system and let every contributor stamp.
fn load<S: NonlinearSystem + ?Sized>(
    system: &mut S,
    solver: &mut Solver<f64>,
    state: &mut SimulationState,
) -> Result<()> {
    solver.clear();
    state.is_convergent = true;
    system.load(solver, state)?;
    solver.apply_diagonal_gmin(state.diagonal_gmin);
    Ok(())
}

fn check_finite(solution: &[f64]) -> Result<()> {
    match solution.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(NodalError::NumericalOverflow {
            index,
            value: solution[index],
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    use crate::simulation::BaseConfiguration;

    /// x^2 = a, solved for x > 0 with a linearized stamp.
    struct SquareRoot {
        target: f64,
    }

    impl NonlinearSystem for SquareRoot {
        fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
            let x = state.solution.get(1).copied().unwrap_or(0.0).max(1e-3);
            // f(x) = x^2 - a, J = 2x: J x_new = J x - f
            let g = 2.0 * x;
            let diag = solver.get_matrix_element(1, 1)?;
            solver[diag] += g;
            let rhs = solver.get_rhs_element(1)?;
            solver[rhs] += g * x - (x * x - self.target);
            Ok(())
        }

        fn is_convergent(&self, _state: &SimulationState) -> bool {
            true
        }

        fn is_nonlinear(&self) -> bool {
            true
        }

        fn kind(&self, _index: usize) -> UnknownKind {
            UnknownKind::Voltage
        }
    }

    /// x^2 + 1 = 0 has no real root.
    struct NoRoot;

    impl NonlinearSystem for NoRoot {
        fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
            let x = state.solution.get(1).copied().unwrap_or(0.0);
            let mut g = 2.0 * x;
            if g.abs() < 1e-6 {
                g = 1e-6_f64.copysign(if g == 0.0 { 1.0 } else { g });
            }
            let diag = solver.get_matrix_element(1, 1)?;
            solver[diag] += g;
            let rhs = solver.get_rhs_element(1)?;
            solver[rhs] += g * x - (x * x + 1.0);
            Ok(())
        }

        fn is_convergent(&self, _state: &SimulationState) -> bool {
            true
        }

        fn is_nonlinear(&self) -> bool {
            true
        }

        fn kind(&self, _index: usize) -> UnknownKind {
            UnknownKind::Voltage
        }
    }

    /// 3 x = 6, linear.
    struct Linear;

    impl NonlinearSystem for Linear {
        fn load(&mut self, solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
            let diag = solver.get_matrix_element(1, 1)?;
            solver[diag] += 3.0;
            let rhs = solver.get_rhs_element(1)?;
            solver[rhs] += 6.0;
            Ok(())
        }

        fn is_convergent(&self, _state: &SimulationState) -> bool {
            true
        }

        fn is_nonlinear(&self) -> bool {
            false
        }

        fn kind(&self, _index: usize) -> UnknownKind {
            UnknownKind::Voltage
        }
    }

    fn state() -> SimulationState {
        let mut state = SimulationState::new(1, &BaseConfiguration::default());
        state.solution[1] = 1.0;
        state
    }

    #[test]
    fn test_square_root_converges() {
        let mut solver = Solver::new();
        let mut st = state();
        let iterations = NewtonRaphson::new()
            .solve(&mut SquareRoot { target: 9.0 }, &mut solver, &mut st)
            .unwrap();
        assert!(iterations > 1);
        assert!(st.is_convergent);
        assert_abs_diff_eq!(st.solution[1], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_no_root_reports_failure() {
        let mut solver = Solver::new();
        let mut st = state();
        let result = NewtonRaphson::new()
            .with_max_iterations(40)
            .solve(&mut NoRoot, &mut solver, &mut st);
        assert_eq!(result, Err(NodalError::ConvergenceFailure { iterations: 40 }));
    }

    #[test]
    fn test_overflowing_iterate_is_reported() {
        /// A contribution that has already overflowed.
        struct Overflowing;
        impl NonlinearSystem for Overflowing {
            fn load(&mut self, solver: &mut Solver<f64>, _: &mut SimulationState) -> Result<()> {
                let diag = solver.get_matrix_element(1, 1)?;
                solver[diag] += 1.0;
                let rhs = solver.get_rhs_element(1)?;
                solver[rhs] += f64::INFINITY;
                Ok(())
            }
            fn is_convergent(&self, _: &SimulationState) -> bool {
                true
            }
            fn is_nonlinear(&self) -> bool {
                true
            }
            fn kind(&self, _: usize) -> UnknownKind {
                UnknownKind::Voltage
            }
        }

        let mut solver = Solver::new();
        let mut st = state();
        let err = NewtonRaphson::new()
            .solve(&mut Overflowing, &mut solver, &mut st)
            .unwrap_err();
        assert!(matches!(err, NodalError::NumericalOverflow { index: 1, .. }), "{err}");
        assert!(!err.is_structural());
    }

    #[test]
    fn test_linear_system_takes_one_pass() {
        let mut solver = Solver::new();
        let mut st = state();
        st.solution[1] = 1e6;
        let iterations = NewtonRaphson::new()
            .solve(&mut Linear, &mut solver, &mut st)
            .unwrap();
        assert_eq!(iterations, 1);
        assert_abs_diff_eq!(st.solution[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_junction_mode_advances_to_float() {
        let mut solver = Solver::new();
        let mut st = state();
        st.init = InitMode::Junction;
        NewtonRaphson::new()
            .solve(&mut SquareRoot { target: 4.0 }, &mut solver, &mut st)
            .unwrap();
        assert_eq!(st.init, InitMode::Float);
    }

    #[test]
    fn test_tolerance_depends_on_kind() {
        struct Currents;
        impl NonlinearSystem for Currents {
            fn load(&mut self, _: &mut Solver<f64>, _: &mut SimulationState) -> Result<()> {
                Ok(())
            }
            fn is_convergent(&self, _: &SimulationState) -> bool {
                true
            }
            fn is_nonlinear(&self) -> bool {
                true
            }
            fn kind(&self, _: usize) -> UnknownKind {
                UnknownKind::Current
            }
        }

        let nr = NewtonRaphson::new().with_tolerances(0.0, 1e-12, 1e-6);
        let mut st = state();
        st.solution[1] = 1e-9;
        st.old_solution[1] = 0.0;
        assert!(!nr.is_convergent(&Currents, &st));
        assert!(nr.is_convergent(&SquareRoot { target: 1.0 }, &st));
    }
}
