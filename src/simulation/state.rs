//! Mutable context shared with every collaborator during an analysis.

use crate::solver::InitMode;

use super::BaseConfiguration;

/// Collects user-visible warnings raised during an analysis.
///
/// Every warning is also forwarded to the `log` facade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
    }
}

/// Simulation context.
///
/// Solutions are indexed by unknown; index 0 is ground and always zero.
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// Present iterate
    pub solution: Vec<f64>,
    /// Previous iterate
    pub old_solution: Vec<f64>,
    /// Initialization mode of the Newton-Raphson sequence
    pub init: InitMode,
    /// Cleared by collaborators that limited their update during `load`
    pub is_convergent: bool,
    /// Whether reactive elements are treated as open or short circuits
    pub use_dc: bool,
    /// Scale applied to independent sources (source stepping)
    pub source_factor: f64,
    /// Conductance added to every diagonal (gmin stepping)
    pub diagonal_gmin: f64,
    /// Junction conductance floor
    pub gmin: f64,
    /// Tolerances for device-local convergence checks
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    /// Time of the point being solved
    pub time: f64,
    /// Circuit temperature (K)
    pub temperature: f64,
    /// Temperature of the model parameters (K)
    pub nominal_temperature: f64,
    pub diagnostics: Diagnostics,
}

impl SimulationState {
    /// State for a system of `size` unknowns (ground excluded).
    pub fn new(size: usize, config: &BaseConfiguration) -> Self {
        Self {
            solution: vec![0.0; size + 1],
            old_solution: vec![0.0; size + 1],
            init: InitMode::None,
            is_convergent: false,
            use_dc: true,
            source_factor: 1.0,
            diagonal_gmin: 0.0,
            gmin: config.gmin,
            relative_tolerance: config.relative_tolerance,
            absolute_tolerance: config.absolute_tolerance,
            time: 0.0,
            temperature: config.temperature,
            nominal_temperature: config.nominal_temperature,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Number of unknowns, ground excluded.
    pub fn size(&self) -> usize {
        self.solution.len() - 1
    }

    /// Voltage between two unknowns of the present iterate.
    pub fn difference(&self, pos: usize, neg: usize) -> f64 {
        self.solution[pos] - self.solution[neg]
    }

    /// Zero both iterates.
    pub fn reset(&mut self) {
        self.solution.iter_mut().for_each(|v| *v = 0.0);
        self.old_solution.iter_mut().for_each(|v| *v = 0.0);
        self.init = InitMode::None;
        self.is_convergent = false;
    }
}
