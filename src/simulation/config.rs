//! Analysis configuration.

use crate::error::{NodalError, Result};
use crate::integration::{IntegrationMethod, MethodKind};
use crate::solver::{
    DEFAULT_ABSOLUTE_THRESHOLD, DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_RELATIVE_THRESHOLD,
    DEFAULT_RELATIVE_TOLERANCE, DEFAULT_VOLTAGE_TOLERANCE, MAX_ITERATIONS, MIN_CONDUCTANCE,
};
use crate::REFERENCE_TEMPERATURE;

/// Settings shared by every analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseConfiguration {
    /// Relative convergence tolerance
    pub relative_tolerance: f64,
    /// Absolute convergence tolerance on branch currents (A)
    pub absolute_tolerance: f64,
    /// Absolute convergence tolerance on node voltages (V)
    pub voltage_tolerance: f64,
    /// Minimum conductance devices add across their junctions (S)
    pub gmin: f64,
    /// Newton-Raphson budget for an operating point
    pub dc_max_iterations: usize,
    /// Decades of diagonal gmin stepping (0 disables)
    pub gmin_steps: usize,
    /// Source stepping increments (0 disables)
    pub source_steps: usize,
    /// Relative pivot threshold of the Markowitz search
    pub relative_pivot_threshold: f64,
    /// Absolute pivot threshold of the Markowitz search
    pub absolute_pivot_threshold: f64,
    /// Circuit temperature (K)
    pub temperature: f64,
    /// Temperature model parameters were measured at (K)
    pub nominal_temperature: f64,
}

impl Default for BaseConfiguration {
    fn default() -> Self {
        Self {
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            voltage_tolerance: DEFAULT_VOLTAGE_TOLERANCE,
            gmin: MIN_CONDUCTANCE,
            dc_max_iterations: MAX_ITERATIONS,
            gmin_steps: 10,
            source_steps: 10,
            relative_pivot_threshold: DEFAULT_RELATIVE_THRESHOLD,
            absolute_pivot_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
            temperature: REFERENCE_TEMPERATURE,
            nominal_temperature: REFERENCE_TEMPERATURE,
        }
    }
}

impl BaseConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the convergence tolerances.
    pub fn with_tolerances(mut self, relative: f64, absolute: f64, voltage: f64) -> Self {
        self.relative_tolerance = relative;
        self.absolute_tolerance = absolute;
        self.voltage_tolerance = voltage;
        self
    }

    pub fn with_gmin(mut self, gmin: f64) -> Self {
        self.gmin = gmin;
        self
    }

    pub fn with_dc_max_iterations(mut self, iterations: usize) -> Self {
        self.dc_max_iterations = iterations;
        self
    }

    /// Set the number of gmin and source stepping increments.
    pub fn with_stepping(mut self, gmin_steps: usize, source_steps: usize) -> Self {
        self.gmin_steps = gmin_steps;
        self.source_steps = source_steps;
        self
    }

    pub fn with_pivot_thresholds(mut self, relative: f64, absolute: f64) -> Self {
        self.relative_pivot_threshold = relative;
        self.absolute_pivot_threshold = absolute;
        self
    }

    /// Set the circuit temperature in Kelvin.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_nominal_temperature(mut self, temperature: f64) -> Self {
        self.nominal_temperature = temperature;
        self
    }

    /// Reject settings no analysis can run with.
    pub fn validate(&self) -> Result<()> {
        positive("relative tolerance", self.relative_tolerance)?;
        positive("absolute tolerance", self.absolute_tolerance)?;
        positive("voltage tolerance", self.voltage_tolerance)?;
        non_negative("gmin", self.gmin)?;
        if self.dc_max_iterations == 0 {
            return Err(NodalError::invalid_param("DC iteration limit must be positive"));
        }
        if !(0.0..=1.0).contains(&self.relative_pivot_threshold)
            || self.relative_pivot_threshold == 0.0
        {
            return Err(NodalError::invalid_param(format!(
                "relative pivot threshold must be in (0, 1], got {}",
                self.relative_pivot_threshold
            )));
        }
        non_negative("absolute pivot threshold", self.absolute_pivot_threshold)?;
        positive("temperature", self.temperature)?;
        positive("nominal temperature", self.nominal_temperature)?;
        Ok(())
    }
}

/// Settings of a transient analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeConfiguration {
    /// Nominal output step
    pub step: f64,
    /// End of the analysis
    pub final_time: f64,
    /// Start of the analysis
    pub initial_time: f64,
    /// Largest internal step; derived from the interval when unset
    pub max_step: Option<f64>,
    /// Newton-Raphson budget per timepoint
    pub transient_max_iterations: usize,
    /// Integration formula
    pub method: MethodKind,
    /// Highest Gear order
    pub max_order: usize,
    /// Truncation error scale
    pub truncation_tolerance: f64,
    /// Charge floor of the truncation tolerance
    pub charge_tolerance: f64,
}

impl TimeConfiguration {
    /// Analysis from 0 to `final_time` with output step `step`.
    pub fn new(step: f64, final_time: f64) -> Self {
        Self {
            step,
            final_time,
            initial_time: 0.0,
            max_step: None,
            transient_max_iterations: 10,
            method: MethodKind::Gear,
            max_order: 2,
            truncation_tolerance: 7.0,
            charge_tolerance: 1e-14,
        }
    }

    pub fn with_initial_time(mut self, time: f64) -> Self {
        self.initial_time = time;
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn with_method(mut self, method: MethodKind) -> Self {
        self.method = method;
        self
    }

    /// Use Gear integration up to `max_order`.
    pub fn with_gear_order(mut self, max_order: usize) -> Self {
        self.method = MethodKind::Gear;
        self.max_order = max_order;
        self
    }

    pub fn with_transient_max_iterations(mut self, iterations: usize) -> Self {
        self.transient_max_iterations = iterations;
        self
    }

    pub fn with_truncation_tolerances(mut self, truncation: f64, charge: f64) -> Self {
        self.truncation_tolerance = truncation;
        self.charge_tolerance = charge;
        self
    }

    /// Largest internal step.
    ///
    /// Defaults to a fiftieth of the interval, bounded by the output step.
    pub fn effective_max_step(&self) -> f64 {
        self.max_step
            .unwrap_or_else(|| ((self.final_time - self.initial_time) / 50.0).min(self.step))
    }

    pub fn validate(&self) -> Result<()> {
        positive("timestep", self.step)?;
        if !self.initial_time.is_finite()
            || !self.final_time.is_finite()
            || self.final_time <= self.initial_time
        {
            return Err(NodalError::invalid_param(format!(
                "final time {} must exceed initial time {}",
                self.final_time, self.initial_time
            )));
        }
        positive("maximum timestep", self.effective_max_step())?;
        if self.transient_max_iterations == 0 {
            return Err(NodalError::invalid_param(
                "transient iteration limit must be positive",
            ));
        }
        positive("truncation tolerance", self.truncation_tolerance)?;
        positive("charge tolerance", self.charge_tolerance)?;
        Ok(())
    }

    /// Build the configured integration method.
    pub fn build_method(&self, base: &BaseConfiguration) -> Result<IntegrationMethod> {
        let method = IntegrationMethod::new(self.method, self.max_order)?;
        Ok(method.with_tolerances(
            base.relative_tolerance,
            base.absolute_tolerance,
            self.truncation_tolerance,
            self.charge_tolerance,
        ))
    }
}

fn positive(what: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NodalError::invalid_param(format!(
            "{what} must be positive, got {value}"
        )))
    }
}

fn non_negative(what: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NodalError::invalid_param(format!(
            "{what} must not be negative, got {value}"
        )))
    }
}
