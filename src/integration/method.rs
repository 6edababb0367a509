//! Multistep integration methods and their state storage.

use std::fmt;

use crate::error::{NodalError, Result};

use super::history::History;

/// Highest supported Gear order.
pub const MAX_GEAR_ORDER: usize = 6;

/// Truncation error factors of the Gear formulas, by order.
const GEAR_FACTORS: [f64; MAX_GEAR_ORDER] = [
    0.5,
    0.222_222_222_2,
    0.136_363_636_4,
    0.096,
    0.072_992_700_73,
    0.058_309_037_90,
];

/// Truncation error factors of the trapezoidal rule, by order.
const TRAPEZOIDAL_FACTORS: [f64; 2] = [0.5, 0.083_333_333_33];

/// Trapezoidal weighting (0.5 is the classic rule).
const XMU: f64 = 0.5;

/// Integration formula family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Variable-order backward differentiation (orders 1 to 6)
    Gear,
    /// Trapezoidal rule (order 1 start-up, then order 2)
    Trapezoidal,
    /// Backward Euler with a fixed step and no truncation control
    FixedEuler,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Gear => write!(f, "gear"),
            MethodKind::Trapezoidal => write!(f, "trapezoidal"),
            MethodKind::FixedEuler => write!(f, "fixed euler"),
        }
    }
}

/// Handle to a differential quantity: slot `index` holds the value and
/// `index + 1` its time derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDerivative {
    index: usize,
}

/// Handle to a plain quantity kept across timepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHistory {
    index: usize,
}

/// Outcome of a truncation check on a solved timepoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepVerdict {
    pub accepted: bool,
    /// Step to use next, or to retry with when rejected
    pub next_delta: f64,
}

/// A multistep integration method.
///
/// Owns the ring of state vectors and the timestep history. Behaviors
/// allocate their states through [`create_derivative`](Self::create_derivative)
/// and [`create_history`](Self::create_history) during setup, write current
/// values while loading, and read companion models back.
///
/// History only moves forward in [`accept`](Self::accept). A rejected
/// timepoint simply gets probed again with a smaller step.
#[derive(Debug, Clone)]
pub struct IntegrationMethod {
    kind: MethodKind,
    max_order: usize,
    order: usize,
    states: History<Vec<f64>>,
    deltas: History<f64>,
    state_count: usize,
    tracked: Vec<usize>,
    coefficients: Vec<f64>,
    base_time: f64,
    time: f64,
    delta: f64,
    nominal_step: f64,
    /// Truncation error scale (trtol)
    pub truncation_tolerance: f64,
    /// Charge floor of the truncation tolerance (chgtol)
    pub charge_tolerance: f64,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl IntegrationMethod {
    /// Create a method of `kind`. `max_order` only matters for Gear; the
    /// trapezoidal rule always goes up to order 2 and fixed Euler stays at 1.
    pub fn new(kind: MethodKind, max_order: usize) -> Result<Self> {
        let max_order = match kind {
            MethodKind::Gear => {
                if !(1..=MAX_GEAR_ORDER).contains(&max_order) {
                    return Err(NodalError::invalid_param(format!(
                        "Gear order must be between 1 and {MAX_GEAR_ORDER}, got {max_order}"
                    )));
                }
                max_order
            }
            MethodKind::Trapezoidal => 2,
            MethodKind::FixedEuler => 1,
        };
        Ok(Self::build(kind, max_order))
    }

    /// Gear method with orders up to `max_order`.
    pub fn gear(max_order: usize) -> Result<Self> {
        Self::new(MethodKind::Gear, max_order)
    }

    pub fn trapezoidal() -> Self {
        Self::build(MethodKind::Trapezoidal, 2)
    }

    pub fn fixed_euler() -> Self {
        Self::build(MethodKind::FixedEuler, 1)
    }

    fn build(kind: MethodKind, max_order: usize) -> Self {
        let points = max_order + 2;
        Self {
            kind,
            max_order,
            order: 1,
            states: History::filled(points, Vec::new()),
            deltas: History::filled(points, 0.0),
            state_count: 0,
            tracked: Vec::new(),
            coefficients: vec![0.0; max_order + 1],
            base_time: 0.0,
            time: 0.0,
            delta: 0.0,
            nominal_step: 0.0,
            truncation_tolerance: 7.0,
            charge_tolerance: 1e-14,
            relative_tolerance: 1e-3,
            absolute_tolerance: 1e-12,
        }
    }

    /// Set the tolerances used by the truncation error estimate.
    pub fn with_tolerances(
        mut self,
        relative: f64,
        absolute: f64,
        truncation: f64,
        charge: f64,
    ) -> Self {
        self.relative_tolerance = relative;
        self.absolute_tolerance = absolute;
        self.truncation_tolerance = truncation;
        self.charge_tolerance = charge;
        self
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Time of the point being solved.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time of the last accepted point.
    pub fn base_time(&self) -> f64 {
        self.base_time
    }

    /// Step being attempted.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Integration coefficients of the present step.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Derivative of the companion model with respect to the integrated
    /// value (the leading coefficient).
    pub fn slope(&self) -> f64 {
        self.coefficients[0]
    }

    /// Timestep `points_back` steps ago; 0 is the present step.
    pub fn timestep(&self, points_back: usize) -> Result<f64> {
        self.deltas.get(points_back).copied()
    }

    /// Allocate a differential quantity.
    ///
    /// Tracked quantities take part in the truncation error estimate.
    pub fn create_derivative(&mut self, track: bool) -> StateDerivative {
        let index = self.allocate(2);
        if track {
            self.tracked.push(index);
        }
        StateDerivative { index }
    }

    /// Allocate a plain quantity that keeps its past values.
    pub fn create_history(&mut self) -> StateHistory {
        StateHistory {
            index: self.allocate(1),
        }
    }

    fn allocate(&mut self, slots: usize) -> usize {
        let index = self.state_count;
        self.state_count += slots;
        let count = self.state_count;
        for i in 0..self.states.len() {
            if let Ok(vector) = self.states.get_mut(i) {
                vector.resize(count, 0.0);
            }
        }
        index
    }

    /// Number of allocated state slots.
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// Prepare for a new transient run starting at `time`.
    ///
    /// The step history is filled with `max_step`; `step` is the nominal
    /// step fixed-step methods always return to.
    pub fn initialize(&mut self, time: f64, step: f64, max_step: f64) {
        self.order = 1;
        self.base_time = time;
        self.time = time;
        self.delta = 0.0;
        self.nominal_step = step;
        self.deltas.clear(max_step);
        self.states.clear(vec![0.0; self.state_count]);
        self.coefficients.iter_mut().for_each(|c| *c = 0.0);
    }

    /// Copy the current state vector into every past slot.
    ///
    /// Called once the initial values have been written.
    pub fn initialize_history(&mut self) {
        let current = self.states.current().clone();
        for i in 1..self.states.len() {
            if let Ok(vector) = self.states.get_mut(i) {
                vector.copy_from_slice(&current);
            }
        }
    }

    /// Set up the point `delta` after the last accepted one.
    pub fn probe(&mut self, delta: f64) -> Result<()> {
        if !(delta > 0.0) || !delta.is_finite() {
            return Err(NodalError::invalid_param(format!(
                "timestep must be positive, got {delta}"
            )));
        }
        self.delta = delta;
        self.time = self.base_time + delta;
        if let Ok(current) = self.deltas.get_mut(0) {
            *current = delta;
        }
        self.compute_coefficients();
        Ok(())
    }

    fn compute_coefficients(&mut self) {
        let delta = self.delta;
        self.coefficients.iter_mut().for_each(|c| *c = 0.0);
        match self.kind {
            MethodKind::FixedEuler => {
                self.coefficients[0] = 1.0 / delta;
                self.coefficients[1] = -1.0 / delta;
            }
            MethodKind::Trapezoidal => match self.order {
                1 => {
                    self.coefficients[0] = 1.0 / delta;
                    self.coefficients[1] = -1.0 / delta;
                }
                _ => {
                    self.coefficients[0] = 1.0 / delta / (1.0 - XMU);
                    self.coefficients[1] = XMU / (1.0 - XMU);
                }
            },
            MethodKind::Gear => {
                let steps: Vec<f64> = self.deltas.iter().copied().collect();
                let ag = gear_coefficients(&steps, self.order);
                self.coefficients[..ag.len()].copy_from_slice(&ag);
            }
        }
    }

    /// Current value of a differential quantity.
    pub fn value(&self, state: StateDerivative) -> f64 {
        self.states.current()[state.index]
    }

    /// Write the current value of a differential quantity.
    pub fn set_value(&mut self, state: StateDerivative, value: f64) {
        self.states.current_mut()[state.index] = value;
    }

    /// Time derivative computed by the last [`integrate`](Self::integrate).
    pub fn derivative(&self, state: StateDerivative) -> f64 {
        self.states.current()[state.index + 1]
    }

    /// Value of a differential quantity `points_back` accepted points ago.
    pub fn past_value(&self, state: StateDerivative, points_back: usize) -> Result<f64> {
        Ok(self.states.get(points_back)?[state.index])
    }

    /// Derivative `points_back` accepted points ago.
    pub fn past_derivative(&self, state: StateDerivative, points_back: usize) -> Result<f64> {
        Ok(self.states.get(points_back)?[state.index + 1])
    }

    /// Compute and store the time derivative of a quantity from its current
    /// value and history.
    pub fn integrate(&mut self, state: StateDerivative) -> f64 {
        let i = state.index;
        let ag = &self.coefficients;
        let derivative = match (self.kind, self.order) {
            (MethodKind::Trapezoidal, 2) => {
                -self.states[1][i + 1] * ag[1] + ag[0] * (self.states[0][i] - self.states[1][i])
            }
            (MethodKind::Gear, order) => (0..=order).map(|k| ag[k] * self.states[k][i]).sum(),
            _ => ag[0] * (self.states[0][i] - self.states[1][i]),
        };
        self.states.current_mut()[i + 1] = derivative;
        derivative
    }

    /// Companion model of `dq/dt` where `q` depends on the unknowns through
    /// `coefficient` (e.g. a capacitance).
    ///
    /// Returns the equivalent conductance and current. Call after
    /// [`integrate`](Self::integrate).
    pub fn companion(&self, state: StateDerivative, coefficient: f64) -> (f64, f64) {
        let slope = self.slope();
        let geq = slope * coefficient;
        let ceq = self.derivative(state) - slope * self.value(state);
        (geq, ceq)
    }

    /// Value of a plain quantity `points_back` accepted points ago.
    pub fn history(&self, state: StateHistory, points_back: usize) -> Result<f64> {
        Ok(self.states.get(points_back)?[state.index])
    }

    /// Write the current value of a plain quantity.
    pub fn set_history(&mut self, state: StateHistory, value: f64) {
        self.states.current_mut()[state.index] = value;
    }

    /// Move past the solved point: rotate the histories and start the next
    /// point from the accepted values.
    pub fn accept(&mut self) {
        self.base_time = self.time;
        self.deltas.cycle();
        self.states.cycle();
        let (previous, current) = (self.states[1].clone(), self.states.current_mut());
        current.copy_from_slice(&previous);
    }

    /// Drop back to first order after a failed timepoint.
    pub fn restart_order(&mut self) {
        self.order = 1;
    }

    /// Judge the solved timepoint by its truncation error.
    ///
    /// Accepts when the estimated step exceeds 0.9 of the present one and
    /// then tries one order higher, keeping it only if that allows a step
    /// more than 5% larger. `max_delta` bounds the suggested next step.
    pub fn evaluate(&mut self, max_delta: f64) -> StepVerdict {
        if self.kind == MethodKind::FixedEuler {
            return StepVerdict {
                accepted: true,
                next_delta: self.nominal_step.min(max_delta),
            };
        }

        let delta = self.delta;
        let mut new_delta = self.truncate(self.order).min(2.0 * delta);
        if new_delta > 0.9 * delta {
            if self.order < self.max_order {
                let higher = self.truncate(self.order + 1).min(2.0 * delta);
                if higher > 1.05 * delta {
                    self.order += 1;
                    new_delta = higher;
                    log::debug!("Integration order raised to {}", self.order);
                }
            }
            StepVerdict {
                accepted: true,
                next_delta: new_delta.min(max_delta),
            }
        } else {
            log::debug!(
                "Timepoint {:.6e} rejected: step {:.3e} -> {:.3e}",
                self.time,
                delta,
                new_delta
            );
            StepVerdict {
                accepted: false,
                next_delta: new_delta,
            }
        }
    }

    /// Largest step allowed by the truncation error of all tracked
    /// quantities at `order`.
    pub fn truncate(&self, order: usize) -> f64 {
        self.tracked
            .iter()
            .map(|&index| self.truncate_state(index, order))
            .fold(f64::INFINITY, f64::min)
    }

    /// Divided-difference truncation estimate of one quantity.
    fn truncate_state(&self, index: usize, order: usize) -> f64 {
        let order = order.clamp(1, self.max_order);
        let factors: &[f64] = match self.kind {
            MethodKind::Trapezoidal => &TRAPEZOIDAL_FACTORS,
            _ => &GEAR_FACTORS,
        };
        let Some(&factor) = factors.get(order - 1) else {
            return f64::INFINITY;
        };

        let q0 = self.states[0][index];
        let q1 = self.states[1][index];
        let c0 = self.states[0][index + 1];
        let c1 = self.states[1][index + 1];
        let current_tol = self.absolute_tolerance + self.relative_tolerance * c0.abs().max(c1.abs());
        let charge_tol = self.relative_tolerance
            * q0.abs().max(q1.abs()).max(self.charge_tolerance)
            / self.delta;
        let tolerance = current_tol.max(charge_tol);

        let points = (order + 2).min(self.states.len());
        let mut diff: Vec<f64> = (0..points).map(|k| self.states[k][index]).collect();
        let mut spans: Vec<f64> = (0..points - 1).map(|k| self.deltas[k]).collect();

        let mut j = points - 2;
        loop {
            for k in 0..=j {
                diff[k] = (diff[k] - diff[k + 1]) / spans[k];
            }
            if j == 0 {
                break;
            }
            j -= 1;
            for k in 0..=j {
                spans[k] = spans[k + 1] + self.deltas[k];
            }
        }

        let error = (factor * diff[0].abs()).max(self.absolute_tolerance);
        let step = self.truncation_tolerance * tolerance / error;
        match order {
            1 => step,
            2 => step.sqrt(),
            n => step.powf(1.0 / n as f64),
        }
    }
}

/// Gear coefficients for variable steps.
///
/// Solves for `ag` such that `x'(t0) = sum(ag[k] * x(t_k))` is exact for
/// polynomials up to `order`, where `steps[k]` is the spacing between point
/// `k` and `k + 1`.
fn gear_coefficients(steps: &[f64], order: usize) -> Vec<f64> {
    let n = order + 1;
    let delta = steps[0];
    let mut mat = vec![vec![0.0; n]; n];
    let mut ag = vec![0.0; n];
    ag[1] = -1.0 / delta;

    for entry in mat[0].iter_mut() {
        *entry = 1.0;
    }
    let mut offset = 0.0;
    for i in 1..n {
        offset += steps[i - 1];
        let mut power = 1.0;
        for row in mat.iter_mut().skip(1) {
            power *= offset / delta;
            row[i] = power;
        }
    }

    // Column 0 is zero below the first row, so elimination starts at 1
    for i in 1..n {
        for j in (i + 1)..n {
            let factor = mat[j][i] / mat[i][i];
            mat[j][i] = factor;
            for k in (i + 1)..n {
                mat[j][k] -= factor * mat[i][k];
            }
        }
    }
    for i in 1..n {
        for j in (i + 1)..n {
            ag[j] -= mat[j][i] * ag[i];
        }
    }
    for i in (0..n).rev() {
        for j in (i + 1)..n {
            ag[i] -= mat[i][j] * ag[j];
        }
        ag[i] /= mat[i][i];
    }
    ag
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gear_coefficients_constant_step() {
        let h = 0.1;
        let steps = [h; 4];
        let be = gear_coefficients(&steps, 1);
        assert_relative_eq!(be[0], 1.0 / h, max_relative = 1e-12);
        assert_relative_eq!(be[1], -1.0 / h, max_relative = 1e-12);

        let bdf2 = gear_coefficients(&steps, 2);
        assert_relative_eq!(bdf2[0], 1.5 / h, max_relative = 1e-12);
        assert_relative_eq!(bdf2[1], -2.0 / h, max_relative = 1e-12);
        assert_relative_eq!(bdf2[2], 0.5 / h, max_relative = 1e-12);
    }

    #[test]
    fn test_gear_exact_for_polynomials() {
        // Uneven steps; order 3 must differentiate a cubic exactly
        let steps = [0.1, 0.25, 0.05, 0.2, 0.3];
        let ag = gear_coefficients(&steps, 3);
        let p = |t: f64| 2.0 * t * t * t - t * t + 3.0 * t + 1.0;
        let dp = |t: f64| 6.0 * t * t - 2.0 * t + 3.0;
        let t0 = 1.0;
        let mut t = t0;
        let mut estimate = 0.0;
        for (k, &a) in ag.iter().enumerate() {
            estimate += a * p(t);
            if k < steps.len() {
                t -= steps[k];
            }
        }
        assert_relative_eq!(estimate, dp(t0), max_relative = 1e-9);
    }

    #[test]
    fn test_gear_order_is_validated() {
        assert!(IntegrationMethod::gear(0).is_err());
        assert!(IntegrationMethod::gear(7).is_err());
        assert_eq!(IntegrationMethod::gear(6).unwrap().max_order(), 6);
    }

    #[test]
    fn test_backward_euler_companion() {
        let mut method = IntegrationMethod::fixed_euler();
        let q = method.create_derivative(true);
        method.initialize(0.0, 1e-3, 1e-3);
        method.set_value(q, 2.0);
        method.initialize_history();

        method.probe(1e-3).unwrap();
        method.set_value(q, 3.0);
        let dq = method.integrate(q);
        assert_relative_eq!(dq, 1000.0);
        let (geq, ceq) = method.companion(q, 1.0);
        assert_relative_eq!(geq, 1000.0);
        // geq * q + ceq reproduces the derivative
        assert_relative_eq!(geq * 3.0 + ceq, dq);
    }

    #[test]
    fn test_trapezoidal_second_order_uses_previous_derivative() {
        let mut method = IntegrationMethod::trapezoidal();
        let q = method.create_derivative(true);
        method.initialize(0.0, 0.1, 0.1);
        method.initialize_history();

        // q = t^2 sampled exactly; order 1 then order 2
        method.probe(0.1).unwrap();
        method.set_value(q, 0.01);
        method.integrate(q);
        method.accept();

        method.order = 2;
        method.probe(0.1).unwrap();
        method.set_value(q, 0.04);
        let dq = method.integrate(q);
        // 2 / h * (0.04 - 0.01) - dq_prev, dq_prev = 0.1
        assert_relative_eq!(dq, 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_rejected_point_leaves_history_alone() {
        let mut method = IntegrationMethod::gear(2).unwrap();
        let q = method.create_derivative(true);
        method.initialize(0.0, 1e-3, 1e-3);
        method.set_value(q, 1.0);
        method.initialize_history();

        method.probe(1e-3).unwrap();
        method.set_value(q, 5.0);
        method.integrate(q);
        let verdict = method.evaluate(1e-3);
        assert!(!verdict.accepted);
        assert!(verdict.next_delta < 1e-3);
        assert_eq!(method.past_value(q, 1).unwrap(), 1.0);
        assert_eq!(method.base_time(), 0.0);

        method.probe(verdict.next_delta).unwrap();
        assert_eq!(method.timestep(0).unwrap(), verdict.next_delta);
        assert_eq!(method.timestep(1).unwrap(), 1e-3);
    }

    #[test]
    fn test_settled_signal_is_accepted_and_order_rises() {
        let mut method = IntegrationMethod::gear(2).unwrap();
        let q = method.create_derivative(true);
        let h = 1e-3;
        method.initialize(0.0, h, h);
        method.set_value(q, 1.0);
        method.initialize_history();

        for n in 1..=4 {
            method.probe(h).unwrap();
            method.set_value(q, 1.0);
            assert_eq!(method.integrate(q), 0.0);
            let verdict = method.evaluate(h);
            assert!(verdict.accepted, "point {n}");
            method.accept();
        }
        assert_eq!(method.order(), 2);
        assert!((method.base_time() - 4.0 * h).abs() < 1e-15);
    }

    #[test]
    fn test_history_handles() {
        let mut method = IntegrationMethod::gear(2).unwrap();
        let v = method.create_history();
        method.initialize(0.0, 1.0, 1.0);
        method.set_history(v, 0.7);
        method.probe(1.0).unwrap();
        method.accept();
        method.set_history(v, 0.9);
        assert_eq!(method.history(v, 0).unwrap(), 0.9);
        assert_eq!(method.history(v, 1).unwrap(), 0.7);
        assert!(method.history(v, 4).is_err());
    }
}
